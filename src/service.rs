// src/service.rs
//! Фасад сервиса: реестр миров по сиду и сессии отображения
//!
//! Миры независимы друг от друга; внутри мира изменяющие операции берут блокировку
//! на запись, чистое чтение на чтение. Экспорт при грязной гидрологии или
//! устаревших дорогах сначала берёт запись, чтобы всё пересчитать, и только потом
//! отдаёт данные.

use crate::api::{
    EditHeightRequest, EditHeightResponse, ExportPlayerMapRequest, ExportPlayerMapResponse,
    HydroRecomputeRequest, HydroRecomputeResponse, PoiQuestSuggestRequest,
    PoiQuestSuggestResponse, PoiSettlementRequest, PoiSettlementResponse, RoadsAutorouteRequest,
    RoadsAutorouteResponse, StyleSwitchRequest, StyleSwitchResponse, WorldExpandRequest,
    WorldExpandResponse,
};
use crate::config::EngineConfig;
use crate::error::{MapError, Result};
use crate::grid::{LocalCoord, TileId};
use crate::style::DisplayConfig;
use crate::world::World;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type WorldHandle = Arc<RwLock<World>>;

fn read(handle: &WorldHandle) -> Result<RwLockReadGuard<'_, World>> {
    handle
        .read()
        .map_err(|_| MapError::Conflict("world lock poisoned".into()))
}

fn write(handle: &WorldHandle) -> Result<RwLockWriteGuard<'_, World>> {
    handle
        .write()
        .map_err(|_| MapError::Conflict("world lock poisoned".into()))
}

/// Все миры процесса, по одному на сид
#[derive(Default)]
pub struct WorldRegistry {
    config: EngineConfig,
    worlds: RwLock<HashMap<String, WorldHandle>>,
}

impl WorldRegistry {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            worlds: RwLock::new(HashMap::new()),
        }
    }

    /// Мир с этим сидом; создаётся (с кольцом 0) при первом обращении
    pub fn open(&self, seed: &str) -> Result<WorldHandle> {
        if let Ok(handle) = self.get(seed) {
            return Ok(handle);
        }
        let mut worlds = self
            .worlds
            .write()
            .map_err(|_| MapError::Conflict("world registry lock poisoned".into()))?;
        if let Some(handle) = worlds.get(seed) {
            return Ok(Arc::clone(handle));
        }
        let world = World::new(seed, self.config.clone())?;
        let handle = Arc::new(RwLock::new(world));
        worlds.insert(seed.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get(&self, seed: &str) -> Result<WorldHandle> {
        let worlds = self
            .worlds
            .read()
            .map_err(|_| MapError::Conflict("world registry lock poisoned".into()))?;
        worlds
            .get(seed)
            .cloned()
            .ok_or_else(|| MapError::WorldNotFound(seed.to_string()))
    }

    /// Сиды всех открытых миров в алфавитном порядке
    pub fn seeds(&self) -> Result<Vec<String>> {
        let worlds = self
            .worlds
            .read()
            .map_err(|_| MapError::Conflict("world registry lock poisoned".into()))?;
        let mut seeds: Vec<_> = worlds.keys().cloned().collect();
        seeds.sort();
        Ok(seeds)
    }

    pub fn expand_world(&self, req: &WorldExpandRequest) -> Result<WorldExpandResponse> {
        req.validate()?;
        let handle = self.open(&req.seed)?;
        let created = write(&handle)?.expand(&req.seed, req.ring, req.direction)?;
        Ok(WorldExpandResponse {
            ok: true,
            seed: req.seed.clone(),
            ring: req.ring,
            direction: req.direction,
            created,
        })
    }

    pub fn edit_height(&self, seed: &str, req: &EditHeightRequest) -> Result<EditHeightResponse> {
        req.validate()?;
        let handle = self.get(seed)?;
        let applied = write(&handle)?.edit_height(req.tile, &req.to_brush(), req.mode)?;
        Ok(EditHeightResponse { ok: true, applied })
    }

    pub fn recompute_hydrology(
        &self,
        seed: &str,
        req: &HydroRecomputeRequest,
    ) -> Result<HydroRecomputeResponse> {
        let handle = self.get(seed)?;
        let report = write(&handle)?.recompute_hydrology(req.tile, req.downstream)?;
        Ok(HydroRecomputeResponse::new(report, req.downstream))
    }

    pub fn place_settlement(
        &self,
        seed: &str,
        req: &PoiSettlementRequest,
    ) -> Result<PoiSettlementResponse> {
        req.validate()?;
        let handle = self.get(seed)?;
        let poi = write(&handle)?.place_settlement(req.subtype, req.loc, req.options)?;
        Ok(PoiSettlementResponse::new(poi, req.options))
    }

    pub fn suggest_quest_sites(
        &self,
        seed: &str,
        req: &PoiQuestSuggestRequest,
    ) -> Result<PoiQuestSuggestResponse> {
        req.validate()?;
        let handle = self.get(seed)?;
        let suggestions = write(&handle)?.suggest_quest_sites(&req.to_query())?;
        Ok(PoiQuestSuggestResponse {
            ok: true,
            suggestions: suggestions.into_iter().map(Into::into).collect(),
        })
    }

    pub fn autoroute_road(
        &self,
        seed: &str,
        req: &RoadsAutorouteRequest,
    ) -> Result<RoadsAutorouteResponse> {
        let (from, to) = req.endpoints()?;
        let handle = self.get(seed)?;
        let road = write(&handle)?.autoroute(&from, &to, req.profile)?;
        Ok(road.into())
    }

    pub fn sample(&self, seed: &str, tile: TileId, local: LocalCoord) -> Result<f32> {
        let handle = self.get(seed)?;
        let world = read(&handle)?;
        world.sample(tile, local)
    }

    pub fn export_player_map(
        &self,
        seed: &str,
        req: &ExportPlayerMapRequest,
    ) -> Result<ExportPlayerMapResponse> {
        req.validate()?;
        let handle = self.get(seed)?;
        let request = req.to_request();
        {
            let world = read(&handle)?;
            if !world.needs_refresh() {
                let bundle = world.export_player_map(&request)?;
                return Ok(ExportPlayerMapResponse { ok: true, bundle });
            }
        }
        let mut world = write(&handle)?;
        world.refresh_hydrology()?;
        let bundle = world.export_player_map(&request)?;
        Ok(ExportPlayerMapResponse { ok: true, bundle })
    }
}

/// Сессия клиента: хранит собственные настройки отображения
#[derive(Debug, Clone, Default)]
pub struct Session {
    display: DisplayConfig,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn display(&self) -> &DisplayConfig {
        &self.display
    }

    pub fn switch_style(&mut self, req: &StyleSwitchRequest) -> StyleSwitchResponse {
        StyleSwitchResponse {
            ok: true,
            style: self.display.switch_style(req.style),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Direction;
    use crate::style::MapStyle;
    use std::thread;

    fn registry() -> WorldRegistry {
        WorldRegistry::new(EngineConfig {
            tile_size: 16,
            ..EngineConfig::default()
        })
    }

    fn expand(seed: &str, ring: u32) -> WorldExpandRequest {
        WorldExpandRequest {
            seed: seed.into(),
            ring,
            direction: Direction::E,
        }
    }

    #[test]
    fn unknown_world_is_not_found() {
        let registry = registry();
        let err = registry
            .sample("nowhere", TileId::ORIGIN, LocalCoord::new(0, 0))
            .unwrap_err();
        assert!(matches!(err, MapError::WorldNotFound(_)));
    }

    #[test]
    fn worlds_are_isolated_by_seed() {
        let registry = registry();
        registry.expand_world(&expand("one", 1)).unwrap();
        registry.open("two").unwrap();
        assert_eq!(registry.seeds().unwrap(), vec!["one".to_string(), "two".to_string()]);
        assert_eq!(read(&registry.get("one").unwrap()).unwrap().max_ring(), 1);
        assert_eq!(read(&registry.get("two").unwrap()).unwrap().max_ring(), 0);
    }

    #[test]
    fn concurrent_expansion_creates_each_ring_once() {
        let registry = registry();
        let created: Vec<usize> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| registry.expand_world(&expand("shared", 1))))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap().created.len())
                .collect()
        });
        assert_eq!(created.iter().filter(|&&n| n == 8).count(), 1);
        assert_eq!(created.iter().filter(|&&n| n == 0).count(), 3);
    }

    #[test]
    fn sessions_switch_styles_independently() {
        let mut a = Session::new();
        let b = Session::new();
        let resp = a.switch_style(&StyleSwitchRequest {
            style: MapStyle::Political,
        });
        assert_eq!(resp.style, MapStyle::Political);
        assert_eq!(a.display().style(), MapStyle::Political);
        assert_eq!(b.display().style(), MapStyle::Realistic);
    }
}
