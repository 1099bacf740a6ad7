pub mod api;
pub mod biome;
pub mod brush;
pub mod config;
pub mod error;
pub mod generator;
pub mod geo;
pub mod grid;
pub mod heightmap;
pub mod hydrology;
pub mod poi;
pub mod roads;
pub mod service;
pub mod store;
pub mod style;
pub mod tile;
pub mod world;

pub use biome::Biome;
pub use brush::{Brush, BrushCenter, BrushMode, BrushShape};
pub use config::EngineConfig;
pub use error::{ErrorKind, MapError, Result};
pub use geo::{GeoPoint, Projection};
pub use grid::{Dir8, Direction, GridIndex, LocalCoord, SampleCoord, TileId};
pub use heightmap::Heightmap;
pub use hydrology::{HydroStatus, HydrologyReport, HydrologyWarning};
pub use poi::{Poi, PoiRegistry, QuestKind, QuestQuery, QuestSuggestion, SettlementKind};
pub use roads::{Road, RoadProfile, RouteEndpoint};
pub use service::{Session, WorldHandle, WorldRegistry};
pub use store::HeightFieldStore;
pub use style::{ExportBundle, MapStyle};
pub use world::World;
