//! Derive macros for marionette-di
//!
//! This crate provides the `#[derive(Service)]` macro, which writes the
//! capability accessors of the `Service` trait from a declarative
//! `#[service(...)]` attribute.
//!
//! # Example
//!
//! ```rust,ignore
//! use marionette_di::{Destroyable, DiResult, Service, Tickable};
//!
//! #[derive(Service)]
//! #[service(tick, destroy)]
//! struct Turret {
//!     heat: f64,
//! }
//!
//! impl Tickable for Turret {
//!     fn on_tick(&self, _delta_time: f64) {}
//! }
//! impl Destroyable for Turret {
//!     fn on_destroy(&self) -> DiResult<()> { Ok(()) }
//! }
//! ```
//!
//! The macro also emits an inherent `SERVICE_CAPS` constant mirroring the
//! accessors, so `Inject::CAPS` cannot drift:
//!
//! ```rust,ignore
//! impl Inject for Turret {
//!     const CAPS: Capabilities = Self::SERVICE_CAPS;
//!     fn construct(args: &mut ConstructArgs) -> DiResult<Self> { /* ... */ }
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, DeriveInput, parse_macro_input};

/// One capability the attribute can name.
#[derive(Default)]
struct Capabilities {
    start: bool,
    warmup: bool,
    destroy: bool,
    tick: bool,
    fixed_tick: bool,
    render_tick: bool,
}

/// Derive the `Service` umbrella trait.
///
/// Without a `#[service(...)]` attribute all accessors keep their `None`
/// defaults. With one, every named capability gets an accessor returning
/// `Some(self)`; the matching capability trait (`Startable`, `Tickable`,
/// ...) must be implemented by hand.
///
/// Accepted capability names: `start`, `warmup`, `destroy`, `tick`,
/// `fixed_tick`, `render_tick`.
#[proc_macro_derive(Service, attributes(service))]
pub fn derive_service(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let caps = match parse_capabilities(&input.attrs) {
        Ok(caps) => caps,
        Err(error) => return error.to_compile_error().into(),
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut accessors = Vec::new();
    let mut cap_calls = Vec::new();

    if caps.start {
        accessors.push(quote! {
            fn as_startable(&self) -> ::core::option::Option<&dyn ::marionette_di::Startable> {
                ::core::option::Option::Some(self)
            }
        });
        cap_calls.push(quote! { .with_start() });
    }
    if caps.warmup {
        accessors.push(quote! {
            fn as_warmup(&self) -> ::core::option::Option<&dyn ::marionette_di::Warmup> {
                ::core::option::Option::Some(self)
            }
        });
        cap_calls.push(quote! { .with_warmup() });
    }
    if caps.destroy {
        accessors.push(quote! {
            fn as_destroyable(&self) -> ::core::option::Option<&dyn ::marionette_di::Destroyable> {
                ::core::option::Option::Some(self)
            }
        });
        cap_calls.push(quote! { .with_destroy() });
    }
    if caps.tick {
        accessors.push(quote! {
            fn as_tickable(&self) -> ::core::option::Option<&dyn ::marionette_di::Tickable> {
                ::core::option::Option::Some(self)
            }
        });
        cap_calls.push(quote! { .with_tick() });
    }
    if caps.fixed_tick {
        accessors.push(quote! {
            fn as_fixed_tickable(&self) -> ::core::option::Option<&dyn ::marionette_di::FixedTickable> {
                ::core::option::Option::Some(self)
            }
        });
        cap_calls.push(quote! { .with_fixed_tick() });
    }
    if caps.render_tick {
        accessors.push(quote! {
            fn as_render_tickable(&self) -> ::core::option::Option<&dyn ::marionette_di::RenderTickable> {
                ::core::option::Option::Some(self)
            }
        });
        cap_calls.push(quote! { .with_render_tick() });
    }

    let expanded: TokenStream2 = quote! {
        impl #impl_generics ::marionette_di::Service for #name #ty_generics #where_clause {
            #(#accessors)*
        }

        impl #impl_generics #name #ty_generics #where_clause {
            /// Capability flags matching the derived `Service` accessors.
            /// Assign to `Inject::CAPS` to keep static and dynamic
            /// capability detection in agreement.
            pub const SERVICE_CAPS: ::marionette_di::Capabilities =
                ::marionette_di::Capabilities::none() #(#cap_calls)*;
        }
    };

    expanded.into()
}

/// Parse `#[service(tick, destroy, ...)]` into capability flags.
fn parse_capabilities(attrs: &[Attribute]) -> syn::Result<Capabilities> {
    let mut caps = Capabilities::default();

    for attr in attrs {
        if !attr.path().is_ident("service") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("start") {
                caps.start = true;
            } else if meta.path.is_ident("warmup") {
                caps.warmup = true;
            } else if meta.path.is_ident("destroy") {
                caps.destroy = true;
            } else if meta.path.is_ident("tick") {
                caps.tick = true;
            } else if meta.path.is_ident("fixed_tick") {
                caps.fixed_tick = true;
            } else if meta.path.is_ident("render_tick") {
                caps.render_tick = true;
            } else {
                return Err(meta.error(
                    "unknown capability; expected one of: start, warmup, destroy, \
                     tick, fixed_tick, render_tick",
                ));
            }
            Ok(())
        })?;
    }

    Ok(caps)
}
