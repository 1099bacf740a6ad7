// src/world.rs
//! Мир: сид, тайлы, реестры POI и дорог
//!
//! Все операции над миром проходят здесь. Правки помечают тайлы грязными;
//! операции, читающие гидрологию (поселения, квесты, дороги), сначала доводят
//! её до чистого состояния, поэтому никогда не видят устаревший сток.

use crate::brush::{self, Brush, BrushMode};
use crate::config::EngineConfig;
use crate::error::{MapError, Result};
use crate::generator::WorldGenerator;
use crate::geo::{GeoPoint, Projection};
use crate::grid::{Direction, GridIndex, LocalCoord, SampleCoord, TileId};
use crate::heightmap::Heightmap;
use crate::hydrology::{self, HydrologyReport};
use crate::poi::{
    self, Poi, PoiRegistry, QuestQuery, QuestSuggestion, SettlementKind, SettlementOptions,
};
use crate::roads::{self, Road, RoadProfile, RoadRegistry, RouteEndpoint};
use crate::store::HeightFieldStore;
use crate::style::{self, ExportBundle, ExportRequest};
use std::collections::BTreeSet;

pub struct World {
    config: EngineConfig,
    generator: WorldGenerator,
    store: HeightFieldStore,
    pois: PoiRegistry,
    roads: RoadRegistry,
}

impl World {
    /// Создаёт мир и сразу генерирует кольцо 0
    pub fn new(seed: &str, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let generator = WorldGenerator::new(seed, &config)?;
        let mut store = HeightFieldStore::new(&config);
        for tile in generator.generate_ring(0) {
            store.insert(tile);
        }
        let pois = PoiRegistry::new(generator.seed_hash());

        tracing::info!(seed, tile_size = config.tile_size, "world created");
        Ok(Self {
            config,
            generator,
            store,
            pois,
            roads: RoadRegistry::default(),
        })
    }

    #[must_use]
    pub fn seed(&self) -> &str {
        self.generator.seed()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &HeightFieldStore {
        &self.store
    }

    /// Прямой доступ к хранилищу для инструментов и тестов
    pub fn store_mut(&mut self) -> &mut HeightFieldStore {
        &mut self.store
    }

    #[must_use]
    pub fn pois(&self) -> &PoiRegistry {
        &self.pois
    }

    #[must_use]
    pub fn roads(&self) -> &RoadRegistry {
        &self.roads
    }

    #[must_use]
    pub fn max_ring(&self) -> u32 {
        self.store.grid().max_ring()
    }

    #[must_use]
    pub fn projection(&self) -> Projection {
        Projection::new(self.config.origin, self.config.km_per_sample)
    }

    /// Нет ли тайлов с устаревшей гидрологией
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.store.dirty_tiles().is_empty()
    }

    /// Нужен ли `refresh_hydrology` перед чтением: есть грязные тайлы или устаревшие дороги
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        !self.is_clean() || self.roads.has_stale()
    }

    /// Расширяет мир на кольцо `ring` и возвращает созданные тайлы.
    ///
    /// Уже существующее кольцо ничего не меняет и возвращает пустой список.
    pub fn expand(&mut self, seed: &str, ring: u32, direction: Direction) -> Result<Vec<TileId>> {
        if seed.is_empty() || seed != self.seed() {
            return Err(MapError::InvalidSeed(seed.to_string()));
        }
        let max_ring = self.max_ring();
        if ring == 0 || ring > max_ring + 1 {
            return Err(MapError::InvalidRing { ring, max_ring });
        }
        if ring <= max_ring {
            tracing::debug!(ring, max_ring, "ring already generated");
            return Ok(Vec::new());
        }

        for tile in self.generator.generate_ring(ring) {
            self.store.insert(tile);
        }
        self.store.grid_mut().set_max_ring(ring);
        // у внешнего края прежнего кольца появились соседи
        for id in GridIndex::tiles_in_ring(ring - 1) {
            self.store.mark_dirty(id)?;
        }

        self.invalidate_roads();

        let created = GridIndex::tiles_in_ring_from(ring, direction);
        tracing::info!(ring, ?direction, tiles = created.len(), "world expanded");
        Ok(created)
    }

    pub fn sample(&self, tile: TileId, local: LocalCoord) -> Result<f32> {
        self.store.sample(tile, local)
    }

    pub fn edit_height(&mut self, tile: TileId, brush: &Brush, mode: BrushMode) -> Result<usize> {
        let modified = brush::apply_brush(&mut self.store, tile, brush, mode, &self.config.brush)?;
        if modified > 0 {
            self.invalidate_roads();
        }
        Ok(modified)
    }

    pub fn recompute_hydrology(&mut self, tile: TileId, downstream: bool) -> Result<HydrologyReport> {
        // дороги помечаются до того, как пересчёт очистит их тайлы
        self.invalidate_roads();
        hydrology::recompute(&mut self.store, tile, downstream, &self.config.hydrology)
    }

    /// Пересчитывает все грязные тайлы и заново прокладывает устаревшие дороги
    pub fn refresh_hydrology(&mut self) -> Result<HydrologyReport> {
        self.invalidate_roads();
        let report = hydrology::refresh(&mut self.store, &self.config.hydrology)?;
        if self.is_clean() {
            self.reroute_stale_roads();
        }
        Ok(report)
    }

    /// Дороги грязных тайлов проложены по рельефу, которого больше нет
    fn invalidate_roads(&mut self) {
        let dirty: BTreeSet<TileId> = self.store.dirty_tiles().into_iter().collect();
        if dirty.is_empty() || self.roads.is_empty() {
            return;
        }
        let marked = self.roads.invalidate(self.store.grid(), &dirty);
        if marked > 0 {
            tracing::debug!(marked, dirty_tiles = dirty.len(), "roads invalidated");
        }
    }

    /// Полная перепрокладка; дорога без пути удаляется
    fn reroute_stale_roads(&mut self) {
        for id in self.roads.stale_ids() {
            let Some(old) = self.roads.get(&id) else {
                continue;
            };
            let profile = old.profile;
            let routed = match (old.from.parse::<RouteEndpoint>(), old.to.parse::<RouteEndpoint>()) {
                (Ok(from), Ok(to)) => {
                    roads::autoroute(&self.store, &self.pois, &from, &to, profile, &self.config)
                }
                (Err(err), _) | (_, Err(err)) => Err(err),
            };
            match routed {
                Ok(road) => {
                    tracing::debug!(road = %road.id, cost_km = road.cost_km, "road rerouted");
                    self.roads.insert(road);
                }
                Err(err) => {
                    tracing::warn!(road = %id, %err, "road dropped after terrain change");
                    self.roads.remove(&id);
                }
            }
        }
    }

    pub fn place_settlement(
        &mut self,
        subtype: SettlementKind,
        loc: GeoPoint,
        options: SettlementOptions,
    ) -> Result<Poi> {
        self.refresh_hydrology()?;
        poi::place_settlement(
            &self.store,
            &mut self.pois,
            subtype,
            loc,
            options,
            &self.config,
        )
    }

    pub fn suggest_quest_sites(&mut self, query: &QuestQuery) -> Result<Vec<QuestSuggestion>> {
        query.validate()?;
        self.refresh_hydrology()?;
        poi::suggest_quest_sites(&self.store, &self.pois, query, &self.config)
    }

    /// Прокладывает дорогу и сохраняет её в реестре (заменяя прежнюю между теми же концами)
    pub fn autoroute(
        &mut self,
        from: &RouteEndpoint,
        to: &RouteEndpoint,
        profile: RoadProfile,
    ) -> Result<Road> {
        self.refresh_hydrology()?;
        let road = roads::autoroute(&self.store, &self.pois, from, to, profile, &self.config)?;
        self.roads.insert(road.clone());
        Ok(road)
    }

    /// Экспорт читает текущее состояние; для актуальной воды мир должен быть чистым.
    /// Устаревшие дороги в экспорт не попадают.
    pub fn export_player_map(&self, request: &ExportRequest) -> Result<ExportBundle> {
        style::export_player_map(&self.store, &self.pois, &self.roads, request, &self.config)
    }

    /// Сводная карта высот всего мира (строка 0 на южном краю)
    #[must_use]
    pub fn height_image(&self) -> Heightmap {
        let (min, max) = self.store.grid().sample_bounds();
        let width = (max.x - min.x + 1) as u32;
        let height = (max.y - min.y + 1) as u32;
        let mut map = Heightmap::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let s = SampleCoord::new(min.x + x as i32, min.y + y as i32);
                if let Some(h) = self.store.elevation_at(s) {
                    map.set(x, y, h);
                }
            }
        }
        map
    }
}
