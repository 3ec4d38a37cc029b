//! This example drives the layers of one dashboard component on an in-memory engine.
//!
//! ```text
//! cargo run --example dashboard -- <dataset dir> <map_config.json> [filter property] [value]
//! ```
//!
//! Datasets are read from `<dataset dir>/<dataset key>.geojson`.

use std::path::PathBuf;

use layerdash::engine::headless::HeadlessEngine;
use layerdash::{DirDatasetLoader, LayerConfig, LayerdashError, MapEvent, MapStoreBuilder};

#[tokio::main]
async fn main() -> Result<(), LayerdashError> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(dir), Some(config_path)) = (args.next(), args.next()) else {
        eprintln!("usage: dashboard <dataset dir> <map_config.json> [property] [value]");
        return Ok(());
    };
    let filter = args.next().zip(args.next());

    let configs = LayerConfig::list_from_json(&std::fs::read_to_string(config_path)?)?;

    let store = MapStoreBuilder::default()
        .with_loader(DirDatasetLoader::new(PathBuf::from(dir)))
        .build()?;
    let engine = HeadlessEngine::default();
    store.initialize(engine.clone());
    store.handle_event(MapEvent::StyleLoaded);

    store.add_to_map_layer_list(&configs)?;
    store.settle().await;
    store.handle_event(MapEvent::Idle);

    if let Some((property, value)) = filter {
        for config in &configs {
            store.add_layer_filter(&config.identity(), &property, value.clone().into())?;
        }
    }

    for config in &configs {
        let identity = config.identity();
        println!("{identity}: {:?}", store.layer_status(&identity));
    }
    println!("Render layers: {:?}", engine.layer_ids());

    store.turn_off_map_layer_visibility(&configs)?;
    println!("Visible after turning off: {:?}", store.visible_layers());

    store.clear_entire_map();
    println!("Engine released: {}", engine.is_released());

    Ok(())
}
