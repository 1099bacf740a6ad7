// src/roads.rs
//! Автопрокладка дорог
//!
//! A* по 8-связной глобальной решётке сэмплов. Стоимость шага в километрах:
//! `длина шага × множитель биома × (1 + вес_уклона × уклон)`, озёра дороже в
//! `lake_multiplier` раз, вход в речной сэмпл добавляет цену моста. Римский профиль
//! строже к уклону и штрафует каждый поворот на 45°, поэтому состояние поиска
//! для него включает направление последнего шага.
//!
//! Эвристика: прямое расстояние в плоскости проекции; все множители ≥ 1,
//! поэтому она допустима и путь оптимален.

use crate::biome::Biome;
use crate::config::EngineConfig;
use crate::error::{MapError, Result};
use crate::geo::{GeoPoint, Projection};
use crate::grid::{Dir8, GridIndex, SampleCoord, TileId};
use crate::poi::PoiRegistry;
use crate::store::HeightFieldStore;
use pathfinding::prelude::astar;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Целочисленная стоимость: 1 единица = 0.1 м пути
const COST_UNITS_PER_KM: f32 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoadProfile {
    #[default]
    Medieval,
    Roman,
}

impl fmt::Display for RoadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoadProfile::Medieval => "medieval",
            RoadProfile::Roman => "roman",
        })
    }
}

/// Множитель стоимости по биому
fn biome_cost(biome: Biome) -> f32 {
    match biome {
        Biome::Plains => 1.0,
        Biome::Desert => 1.3,
        Biome::Forest => 1.4,
        Biome::Hills => 1.6,
        Biome::Swamp => 2.2,
        Biome::Mountains => 2.5,
    }
}

/// Конец маршрута: тайл `"x:y"` (его центральный сэмпл) или идентификатор POI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEndpoint {
    Tile(TileId),
    Poi(String),
}

impl FromStr for RouteEndpoint {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MapError::Validation("route endpoint must not be empty".into()));
        }
        Ok(s.parse::<TileId>()
            .map_or_else(|_| RouteEndpoint::Poi(s.to_string()), RouteEndpoint::Tile))
    }
}

impl fmt::Display for RouteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteEndpoint::Tile(id) => write!(f, "{id}"),
            RouteEndpoint::Poi(id) => f.write_str(id),
        }
    }
}

impl RouteEndpoint {
    fn resolve(&self, store: &HeightFieldStore, pois: &PoiRegistry) -> Result<SampleCoord> {
        match self {
            RouteEndpoint::Tile(id) => {
                store.tile(*id)?;
                Ok(store.grid().tile_center(*id))
            }
            RouteEndpoint::Poi(id) => Ok(pois.get(id)?.sample),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bridge {
    #[serde(rename = "atIndex")]
    pub at_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Road {
    pub id: String,
    pub from: String,
    pub to: String,
    pub profile: RoadProfile,
    pub waypoints: Vec<SampleCoord>,
    pub polyline: Vec<GeoPoint>,
    pub bridges: Vec<Bridge>,
    pub cost_km: f32,
}

/// Дороги мира; повторная прокладка между теми же концами заменяет старую.
///
/// Дорога, по тайлам которой прошло изменение рельефа, помечается устаревшей
/// и не экспортируется, пока её не проложат заново.
#[derive(Debug, Clone, Default)]
pub struct RoadRegistry {
    roads: BTreeMap<String, Road>,
    stale: BTreeSet<String>,
}

impl RoadRegistry {
    pub fn insert(&mut self, road: Road) -> Option<Road> {
        self.stale.remove(&road.id);
        self.roads.insert(road.id.clone(), road)
    }

    pub fn remove(&mut self, id: &str) -> Option<Road> {
        self.stale.remove(id);
        self.roads.remove(id)
    }

    /// Помечает устаревшими дороги, проходящие через любой из `tiles`; возвращает их число
    pub fn invalidate(&mut self, grid: &GridIndex, tiles: &BTreeSet<TileId>) -> usize {
        let mut marked = 0;
        for road in self.roads.values() {
            if self.stale.contains(&road.id) {
                continue;
            }
            if road.waypoints.iter().any(|&s| tiles.contains(&grid.split(s).0)) {
                self.stale.insert(road.id.clone());
                marked += 1;
            }
        }
        marked
    }

    #[must_use]
    pub fn is_stale(&self, id: &str) -> bool {
        self.stale.contains(id)
    }

    #[must_use]
    pub fn has_stale(&self) -> bool {
        !self.stale.is_empty()
    }

    #[must_use]
    pub fn stale_ids(&self) -> Vec<String> {
        self.stale.iter().cloned().collect()
    }

    /// Дороги, проложенные по текущему рельефу
    pub fn current(&self) -> impl Iterator<Item = &Road> {
        self.roads.values().filter(|r| !self.stale.contains(&r.id))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Road> {
        self.roads.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Road> {
        self.roads.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roads.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Step {
    at: SampleCoord,
    heading: Option<Dir8>,
}

struct CostModel<'a> {
    store: &'a HeightFieldStore,
    config: &'a EngineConfig,
    profile: RoadProfile,
}

impl CostModel<'_> {
    fn is_river(&self, s: SampleCoord) -> bool {
        self.store
            .accumulation_at(s)
            .is_some_and(|a| a >= self.config.hydrology.river_threshold)
    }

    fn step_cost_km(&self, from: Step, dir: Dir8, to: SampleCoord, rise: f32) -> Option<f32> {
        let biome = self.store.biome_at(to)?;
        let roads = &self.config.roads;
        let run_km = dir.length() * self.config.km_per_sample;
        let slope = rise.abs() / (run_km * 1000.0);

        let slope_weight = match self.profile {
            RoadProfile::Medieval => roads.medieval_slope_weight,
            RoadProfile::Roman => roads.roman_slope_weight,
        };
        let mut factor = biome_cost(biome) * (1.0 + slope_weight * slope);
        if self.store.is_lake_at(to) {
            factor *= roads.lake_multiplier;
        }

        let mut cost = run_km * factor;
        if self.is_river(to) {
            cost += roads.bridge_cost_km;
        }
        if let (RoadProfile::Roman, Some(heading)) = (self.profile, from.heading) {
            cost += heading.turn_steps(dir) as f32 * roads.roman_turn_penalty_km;
        }
        Some(cost)
    }

    fn successors(&self, step: &Step) -> Vec<(Step, u64)> {
        let Some(here) = self.store.elevation_at(step.at) else {
            return Vec::new();
        };
        Dir8::ALL
            .into_iter()
            .filter_map(|dir| {
                let at = step.at.step(dir);
                let there = self.store.elevation_at(at)?;
                let cost = self.step_cost_km(*step, dir, at, there - here)?;
                let heading = (self.profile == RoadProfile::Roman).then_some(dir);
                Some((Step { at, heading }, (cost * COST_UNITS_PER_KM).ceil() as u64))
            })
            .collect()
    }
}

/// Прокладывает дорогу между двумя концами; в реестр её кладёт вызывающий
pub fn autoroute(
    store: &HeightFieldStore,
    pois: &PoiRegistry,
    from: &RouteEndpoint,
    to: &RouteEndpoint,
    profile: RoadProfile,
    config: &EngineConfig,
) -> Result<Road> {
    let start = from.resolve(store, pois)?;
    let goal = to.resolve(store, pois)?;
    let projection = Projection::new(config.origin, config.km_per_sample);
    let model = CostModel {
        store,
        config,
        profile,
    };

    let (path, cost) = astar(
        &Step {
            at: start,
            heading: None,
        },
        |step| model.successors(step),
        |step| (projection.distance_km(step.at, goal) * COST_UNITS_PER_KM).floor() as u64,
        |step| step.at == goal,
    )
    .ok_or_else(|| MapError::NoPath {
        from: from.to_string(),
        to: to.to_string(),
    })?;

    let waypoints: Vec<SampleCoord> = path.into_iter().map(|s| s.at).collect();
    let bridges = waypoints
        .iter()
        .enumerate()
        .filter(|&(_, &s)| model.is_river(s))
        .map(|(at_index, _)| Bridge { at_index })
        .collect::<Vec<_>>();
    let polyline = waypoints.iter().map(|&s| projection.to_geo(s)).collect();
    let cost_km = cost as f32 / COST_UNITS_PER_KM;

    tracing::debug!(
        %from,
        %to,
        %profile,
        waypoints = waypoints.len(),
        bridges = bridges.len(),
        cost_km,
        "road routed"
    );

    Ok(Road {
        id: format!("road:{profile}:{from}->{to}"),
        from: from.to_string(),
        to: to.to_string(),
        profile,
        waypoints,
        polyline,
        bridges,
        cost_km,
    })
}
