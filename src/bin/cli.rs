use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use worldmap::poi::SettlementOptions;
use worldmap::{Direction, EngineConfig, RoadProfile, RouteEndpoint, SettlementKind, TileId, World};

/// Генератор тайловых карт мира
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Путь к конфигурационному файлу в формате TOML (по умолчанию встроенные параметры)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Сид мира
    #[arg(short, long, default_value = "demo")]
    seed: String,

    /// Сколько колец вокруг центрального тайла сгенерировать
    #[arg(short, long, default_value_t = 1)]
    rings: u32,

    /// Путь для сохранения сводной карты высот в PNG
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Поставить два поселения и проложить между ними дорогу
    #[arg(long)]
    demo: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            EngineConfig::from_toml_file(path)?
        }
        None => EngineConfig::default(),
    };

    let mut world = World::new(&cli.seed, config)?;
    for ring in 1..=cli.rings {
        world.expand(&cli.seed, ring, Direction::E)?;
    }
    let report = world.refresh_hydrology()?;
    for warning in &report.warnings {
        tracing::warn!(%warning, "hydrology");
    }

    let mut demo = serde_json::Value::Null;
    if cli.demo {
        demo = run_demo(&mut world);
    }

    if let Some(path) = &cli.output {
        let path = path.to_str().ok_or("output path is not valid UTF-8")?;
        world.height_image().save_as_png(path)?;
        tracing::info!(path, "height map saved");
    }

    let summary = json!({
        "seed": world.seed(),
        "rings": world.max_ring(),
        "tiles": world.store().tile_ids().len(),
        "tile_size": world.config().tile_size,
        "settlements": world.pois().len(),
        "roads": world.roads().len(),
        "demo": demo,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Неудачи демо-сценария не прерывают работу: о них сообщается в журнал и в сводку
fn run_demo(world: &mut World) -> serde_json::Value {
    let projection = world.projection();
    let grid = world.store().grid().clone();
    let far = if world.max_ring() > 0 {
        TileId::new(1, 0)
    } else {
        TileId::ORIGIN
    };

    let mut ids = Vec::new();
    for (tile, subtype) in [(TileId::ORIGIN, SettlementKind::City), (far, SettlementKind::Village)] {
        let loc = projection.to_geo(grid.tile_center(tile));
        match world.place_settlement(subtype, loc, SettlementOptions::default()) {
            Ok(poi) => ids.push(poi.id),
            Err(err) => {
                tracing::warn!(%tile, %err, "settlement not placed");
                return json!({ "error": err.to_string() });
            }
        }
    }

    let from = RouteEndpoint::Poi(ids[0].clone());
    let to = RouteEndpoint::Poi(ids[1].clone());
    match world.autoroute(&from, &to, RoadProfile::Medieval) {
        Ok(road) => json!({
            "settlements": ids,
            "road": road.id,
            "cost_km": road.cost_km,
            "bridges": road.bridges.len(),
        }),
        Err(err) => {
            tracing::warn!(%err, "road not routed");
            json!({ "settlements": ids, "error": err.to_string() })
        }
    }
}
