//! Example that demonstrates the usage shown in the README.md file.
//!
//! A registry serves pooled projectiles. One template is missing from the asset source and
//! falls back to a placeholder.

use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use recycling_pool::{
    AssetSource, ErrorConfig, ErrorStrategy, PoolConfig, PoolRegistry, Poolable, SizeConfig,
    TemplateLoadError,
};

#[derive(Debug)]
struct Projectile {
    kind: &'static str,
    shots: u32,
}

impl Poolable for Projectile {
    fn on_acquired(&mut self) {
        self.shots += 1;
    }
}

struct Armory;

impl AssetSource for Armory {
    type Key = &'static str;
    type Template = &'static str;
    type Instance = Projectile;

    fn load(
        &self,
        key: &&'static str,
    ) -> LocalBoxFuture<'static, Result<&'static str, TemplateLoadError>> {
        let key = *key;

        async move {
            match key {
                "arrow" | "placeholder" => Ok(key),
                _ => Err(TemplateLoadError::unavailable(&key, "not in the armory")),
            }
        }
        .boxed_local()
    }

    fn instantiate(&self, _key: &&'static str, template: &&'static str) -> Projectile {
        Projectile {
            kind: *template,
            shots: 0,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== Recycling Pool README Example ===");

    let config = PoolConfig::default()
        .with_size(SizeConfig::default().with_initial_size(2).with_max_size(8))
        .with_error(
            ErrorConfig::default()
                .with_strategy(ErrorStrategy::ReturnFallback)
                .with_fallback_template("placeholder"),
        );

    let registry = PoolRegistry::with_default_config(Rc::new(Armory), config);

    // The first acquisition loads the template and warms the pool.
    let arrow = registry.acquire("arrow").await.unwrap();
    println!("Acquired {:?}", arrow.with(|p| p.kind));
    assert!(registry.release(&arrow));

    // The released instance is reused.
    let arrow = registry.acquire("arrow").await.unwrap();
    assert_eq!(arrow.with(|p| p.shots), Some(2));
    assert!(arrow.release());

    // A missing template is replaced by the fallback.
    let cannonball = registry.acquire("cannonball").await.unwrap();
    assert_eq!(cannonball.with(|p| p.kind), Some("placeholder"));

    for snapshot in registry.snapshot() {
        println!(
            "{}: {} live, {} free, {} acquired in total",
            snapshot.key, snapshot.live, snapshot.free, snapshot.acquired_total
        );
    }

    registry.clear_all();
    assert!(registry.is_empty());

    println!("README example completed successfully!");
}
