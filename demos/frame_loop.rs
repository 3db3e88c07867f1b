//! End-to-end demo: a per-player object graph driven by a frame loop
//!
//! Run with:
//!   cargo run --example frame_loop

use marionette_di::{
    ClassMeta, ConstructArgs, Container, Destroyable, DiResult, Inject, ManualTickDriver, Module,
    ScopeModule, Service, Startable, Tickable, Token, create_token,
};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

static PLAYER_TOKEN: Lazy<Token> = Lazy::new(|| create_token("PlayerToken"));

// Global configuration, shared by every player graph.
struct Config {
    move_speed: f64,
}
impl Service for Config {}
impl Inject for Config {
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self { move_speed: 16.0 })
    }
}

// The external entity a scope is built around.
struct Player {
    name: String,
}
impl Service for Player {}

// One per player: started on scope creation, ticked every logic frame,
// destroyed when the player leaves.
struct Movement {
    config: Arc<Config>,
    player: Arc<Player>,
    frames: AtomicU32,
}
impl Startable for Movement {
    fn on_start(&self) -> DiResult<()> {
        println!("[{}] movement online (speed {})", self.player.name, self.config.move_speed);
        Ok(())
    }
}
impl Tickable for Movement {
    fn on_tick(&self, delta_time: f64) {
        let frame = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[{}] frame {frame}, dt {delta_time:.4}", self.player.name);
    }
}
impl Destroyable for Movement {
    fn on_destroy(&self) -> DiResult<()> {
        println!("[{}] movement offline", self.player.name);
        Ok(())
    }
}
impl Service for Movement {
    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }
    fn as_tickable(&self) -> Option<&dyn Tickable> {
        Some(self)
    }
    fn as_destroyable(&self) -> Option<&dyn Destroyable> {
        Some(self)
    }
}
impl Inject for Movement {
    const CAPS: marionette_di::Capabilities = marionette_di::Capabilities::none()
        .with_start()
        .with_tick()
        .with_destroy();
    fn metadata() -> ClassMeta {
        ClassMeta::new()
            .dependency::<Config>(0)
            .token_dependency(1, &*PLAYER_TOKEN)
    }
    fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self {
            config: args.dependency()?,
            player: args.dependency()?,
            frames: AtomicU32::new(0),
        })
    }
}

fn player_scope(player: Player) -> ScopeModule {
    ScopeModule::builder()
        .root::<Movement>()
        .external(&*PLAYER_TOKEN, player)
        .build()
}

fn main() {
    let driver = ManualTickDriver::new(false);
    let container = Container::with_driver(Arc::new(driver.clone()));

    container
        .use_module(
            &Module::builder()
                .single::<Config>()
                .scoped::<Movement>()
                .expects_external(&*PLAYER_TOKEN)
                .build(),
        )
        .expect("module ingest");
    container.launch().expect("launch");

    // Two players join: one scope each.
    let zoe = container
        .create_scope(&player_scope(Player { name: "zoe".into() }))
        .expect("scope");
    let ada = container
        .create_scope(&player_scope(Player { name: "ada".into() }))
        .expect("scope");

    // The host frame loop delivers three logic ticks.
    for _ in 0..3 {
        driver.step(1.0 / 60.0);
    }

    // zoe leaves: her graph is destroyed and stops ticking.
    zoe.destroy();
    driver.step(1.0 / 60.0);

    println!("dispatcher: {:?}", container.tick_dispatcher().debug_info());
    println!("ada scope: {:?}", ada.debug());

    ada.destroy();
}
