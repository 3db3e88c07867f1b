//! Benchmarks for the resolution and tick dispatch hot paths

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use marionette_di::{
    ClassMeta, ConstructArgs, Container, DiResult, Inject, ManualTickDriver, Module, ScopeModule,
    Service, Tickable,
};
use std::hint::black_box;
use std::sync::Arc;

struct Config {
    max_players: u32,
}
impl Service for Config {}
impl Inject for Config {
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self { max_players: 16 })
    }
}

struct Matchmaker {
    config: Arc<Config>,
}
impl Service for Matchmaker {}
impl Inject for Matchmaker {
    fn metadata() -> ClassMeta {
        ClassMeta::new().dependency::<Config>(0)
    }
    fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self {
            config: args.dependency()?,
        })
    }
}

struct Session;
impl Service for Session {}
impl Inject for Session {
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self)
    }
}

struct Projectile;
impl Service for Projectile {}
impl Inject for Projectile {
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self)
    }
}

struct Spinner;
impl Tickable for Spinner {
    fn on_tick(&self, delta_time: f64) {
        black_box(delta_time);
    }
}
impl Service for Spinner {
    fn as_tickable(&self) -> Option<&dyn Tickable> {
        Some(self)
    }
}
impl Inject for Spinner {
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self)
    }
}

fn app_module() -> Module {
    Module::builder()
        .single::<Config>()
        .single::<Matchmaker>()
        .scoped::<Session>()
        .factory::<Projectile>()
        .scoped::<Spinner>()
        .build()
}

fn bench_singleton_resolve(c: &mut Criterion) {
    let container = Container::new();
    container.use_module(&app_module()).unwrap();
    // Warm the cache so the measurement is the hot path.
    let _ = container.resolve::<Matchmaker>().unwrap();

    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(1));
    group.bench_function("singleton_cached", |b| {
        b.iter(|| {
            let service = container.resolve::<Matchmaker>().unwrap();
            black_box(service.config.max_players);
        });
    });
    group.finish();
}

fn bench_scoped_resolve(c: &mut Criterion) {
    let container = Container::new();
    container.use_module(&app_module()).unwrap();
    let scope = container.create_scope(&ScopeModule::empty()).unwrap();
    let _ = scope.resolve::<Session>().unwrap();

    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(1));
    group.bench_function("scoped_cached", |b| {
        b.iter(|| {
            black_box(scope.resolve::<Session>().unwrap());
        });
    });
    group.bench_function("factory_fresh", |b| {
        b.iter(|| {
            black_box(scope.resolve::<Projectile>().unwrap());
        });
    });
    group.finish();
}

fn bench_scope_churn(c: &mut Criterion) {
    let container = Container::new();
    container.use_module(&app_module()).unwrap();

    c.bench_function("scope_create_resolve_destroy", |b| {
        b.iter(|| {
            let scope = container.create_scope(&ScopeModule::empty()).unwrap();
            black_box(scope.resolve::<Session>().unwrap());
            scope.destroy();
        });
    });
}

fn bench_tick_fanout(c: &mut Criterion) {
    let driver = ManualTickDriver::new(false);
    let container = Container::with_driver(Arc::new(driver.clone()));
    container.use_module(&app_module()).unwrap();

    let scope = container.create_scope(&ScopeModule::empty()).unwrap();
    let _ = scope.resolve::<Spinner>().unwrap();
    let dispatcher = container.tick_dispatcher();
    for _ in 0..63 {
        dispatcher.register_tickable(Arc::new(Spinner));
    }

    let mut group = c.benchmark_group("tick");
    group.throughput(Throughput::Elements(64));
    group.bench_function("fanout_64", |b| {
        b.iter(|| {
            driver.step(black_box(1.0 / 60.0));
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_singleton_resolve,
    bench_scoped_resolve,
    bench_scope_churn,
    bench_tick_fanout
);
criterion_main!(benches);
