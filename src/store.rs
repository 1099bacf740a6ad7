// src/store.rs
//! Хранилище поля высот
//!
//! Тайлы лежат в плоском контейнере по идентификатору, соседство вычисляет [`GridIndex`].
//! Любая запись высоты помечает тайл грязным для гидрологии; запись в краевой сэмпл
//! помечает и соседние тайлы, чьи граничные направления стока читают этот сэмпл.

use crate::biome::{Biome, BiomeClassifier};
use crate::config::EngineConfig;
use crate::error::{MapError, Result};
use crate::grid::{Dir8, GridIndex, LocalCoord, SampleCoord, TileId};
use crate::hydrology::{FlowDir, HydroStatus};
use crate::tile::Tile;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct HeightFieldStore {
    grid: GridIndex,
    tiles: HashMap<TileId, Tile>,
    min_elevation: f32,
    max_elevation: f32,
    classifier: BiomeClassifier,
}

impl HeightFieldStore {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            grid: GridIndex::new(config.tile_size),
            tiles: HashMap::new(),
            min_elevation: config.min_elevation,
            max_elevation: config.max_elevation,
            classifier: BiomeClassifier::new(
                config.generation.elevation_floor,
                config.generation.height_scale,
            ),
        }
    }

    #[must_use]
    pub fn grid(&self) -> &GridIndex {
        &self.grid
    }

    pub(crate) fn grid_mut(&mut self) -> &mut GridIndex {
        &mut self.grid
    }

    #[must_use]
    pub fn tile_size(&self) -> usize {
        self.grid.tile_size() as usize
    }

    #[must_use]
    pub fn clamp(&self, elevation: f32) -> f32 {
        elevation.clamp(self.min_elevation, self.max_elevation)
    }

    #[must_use]
    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.contains_key(&id)
    }

    pub fn tile(&self, id: TileId) -> Result<&Tile> {
        self.tiles.get(&id).ok_or(MapError::TileNotFound(id))
    }

    pub(crate) fn tile_mut(&mut self, id: TileId) -> Result<&mut Tile> {
        self.tiles.get_mut(&id).ok_or(MapError::TileNotFound(id))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Идентификаторы всех тайлов в детерминированном порядке
    #[must_use]
    pub fn tile_ids(&self) -> Vec<TileId> {
        let mut ids: Vec<_> = self.tiles.keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn insert(&mut self, tile: Tile) {
        self.tiles.insert(tile.id, tile);
    }

    fn check_local(&self, id: TileId, local: LocalCoord) -> Result<()> {
        let n = self.tile_size();
        if local.x < n && local.y < n {
            Ok(())
        } else {
            Err(MapError::OutOfBounds(self.grid.join(id, local)))
        }
    }

    pub fn sample(&self, id: TileId, local: LocalCoord) -> Result<f32> {
        let tile = self.tile(id)?;
        self.check_local(id, local)?;
        Ok(tile.elevation_at(local))
    }

    /// Записывает высоту (с ограничением диапазона) и возвращает фактически записанное значение
    pub fn set_sample(&mut self, id: TileId, local: LocalCoord, elevation: f32) -> Result<f32> {
        if !elevation.is_finite() {
            return Err(MapError::Validation(format!(
                "elevation must be finite, got {elevation}"
            )));
        }
        self.check_local(id, local)?;
        let value = self.clamp(elevation);
        let classifier = self.classifier;
        let tile = self.tile_mut(id)?;
        let idx = tile.index(local);
        tile.elevation.data[idx] = value;
        tile.biomes[idx] = classifier.classify(value, tile.moisture[idx]);
        tile.refresh_biome();
        tile.hydrology.status = HydroStatus::Dirty;

        if self.grid.is_edge(local) {
            self.mark_sample_neighbors(self.grid.join(id, local));
        }
        Ok(value)
    }

    pub fn mark_dirty(&mut self, id: TileId) -> Result<()> {
        self.tile_mut(id)?.hydrology.status = HydroStatus::Dirty;
        Ok(())
    }

    /// Помечает грязными тайлы, которым принадлежат 8 соседей сэмпла
    fn mark_sample_neighbors(&mut self, sample: SampleCoord) {
        for dir in Dir8::ALL {
            let (tile, _) = self.grid.split(sample.step(dir));
            if let Some(t) = self.tiles.get_mut(&tile) {
                t.hydrology.status = HydroStatus::Dirty;
            }
        }
    }

    #[must_use]
    pub fn is_dirty(&self, id: TileId) -> bool {
        self.tiles
            .get(&id)
            .is_some_and(|t| t.hydrology.status != HydroStatus::Clean)
    }

    #[must_use]
    pub fn dirty_tiles(&self) -> Vec<TileId> {
        let mut ids: Vec<_> = self
            .tiles
            .values()
            .filter(|t| t.hydrology.status != HydroStatus::Clean)
            .map(|t| t.id)
            .collect();
        ids.sort();
        ids
    }

    /// Выравнивает весь тайл до одной высоты
    pub fn fill_tile(&mut self, id: TileId, elevation: f32) -> Result<()> {
        if !elevation.is_finite() {
            return Err(MapError::Validation("elevation must be finite".into()));
        }
        let value = self.clamp(elevation);
        let classifier = self.classifier;
        let tile = self.tile_mut(id)?;
        tile.elevation.data.fill(value);
        for (biome, &moisture) in tile.biomes.iter_mut().zip(&tile.moisture) {
            *biome = classifier.classify(value, moisture);
        }
        tile.refresh_biome();
        tile.hydrology.status = HydroStatus::Dirty;
        for neighbor in self.grid.neighbors(id) {
            if let Some(t) = self.tiles.get_mut(&neighbor) {
                t.hydrology.status = HydroStatus::Dirty;
            }
        }
        Ok(())
    }

    /// Атомарно применяет подготовленные записи: сначала проверка, затем запись и пометки
    pub(crate) fn commit(
        &mut self,
        writes: &[(SampleCoord, f32)],
        dirty: &BTreeSet<TileId>,
    ) -> Result<()> {
        for &(sample, _) in writes {
            let (id, _) = self.grid.split(sample);
            if !self.contains(id) {
                return Err(MapError::TileNotFound(id));
            }
        }
        let classifier = self.classifier;
        let mut touched = BTreeSet::new();
        for &(sample, value) in writes {
            let (id, local) = self.grid.split(sample);
            let value = value.clamp(self.min_elevation, self.max_elevation);
            let tile = self.tile_mut(id)?;
            let idx = tile.index(local);
            tile.elevation.data[idx] = value;
            tile.biomes[idx] = classifier.classify(value, tile.moisture[idx]);
            touched.insert(id);
        }
        for id in &touched {
            self.tile_mut(*id)?.refresh_biome();
        }
        for &id in dirty {
            if let Some(tile) = self.tiles.get_mut(&id) {
                tile.hydrology.status = HydroStatus::Dirty;
            }
        }
        Ok(())
    }

    fn locate(&self, sample: SampleCoord) -> Option<(&Tile, usize)> {
        let (id, local) = self.grid.split(sample);
        self.tiles.get(&id).map(|tile| (tile, tile.index(local)))
    }

    #[must_use]
    pub fn contains_sample(&self, sample: SampleCoord) -> bool {
        self.locate(sample).is_some()
    }

    #[must_use]
    pub fn elevation_at(&self, sample: SampleCoord) -> Option<f32> {
        self.locate(sample)
            .map(|(tile, idx)| tile.elevation.data[idx])
    }

    /// Поверхность стока: заполненная высота для чистого тайла, иначе исходная
    #[must_use]
    pub fn drainage_at(&self, sample: SampleCoord) -> Option<f32> {
        self.locate(sample).map(|(tile, idx)| {
            let hydro = &tile.hydrology;
            if hydro.status == HydroStatus::Clean && hydro.is_computed() {
                hydro.filled[idx]
            } else {
                tile.elevation.data[idx]
            }
        })
    }

    #[must_use]
    pub fn accumulation_at(&self, sample: SampleCoord) -> Option<f32> {
        self.locate(sample).and_then(|(tile, idx)| {
            let hydro = &tile.hydrology;
            hydro.is_computed().then(|| hydro.accumulation[idx])
        })
    }

    #[must_use]
    pub fn flow_at(&self, sample: SampleCoord) -> Option<FlowDir> {
        self.locate(sample).and_then(|(tile, idx)| {
            let hydro = &tile.hydrology;
            hydro.is_computed().then(|| hydro.flow[idx])
        })
    }

    #[must_use]
    pub fn is_lake_at(&self, sample: SampleCoord) -> bool {
        self.locate(sample)
            .is_some_and(|(tile, idx)| tile.hydrology.is_computed() && tile.hydrology.lake[idx])
    }

    #[must_use]
    pub fn biome_at(&self, sample: SampleCoord) -> Option<Biome> {
        self.locate(sample).map(|(tile, idx)| tile.biomes[idx])
    }

    /// Наибольший уклон (подъём/расстояние) к любому из 8 соседей
    #[must_use]
    pub fn slope_at(&self, sample: SampleCoord, km_per_sample: f32) -> Option<f32> {
        let here = self.elevation_at(sample)?;
        let mut slope = 0.0f32;
        for dir in Dir8::ALL {
            if let Some(there) = self.elevation_at(sample.step(dir)) {
                let run_m = dir.length() * km_per_sample * 1000.0;
                slope = slope.max((there - here).abs() / run_m);
            }
        }
        Some(slope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::Heightmap;

    fn store_with_ring(ring: u32) -> HeightFieldStore {
        let config = EngineConfig {
            tile_size: 8,
            ..EngineConfig::default()
        };
        let mut store = HeightFieldStore::new(&config);
        for r in 0..=ring {
            for id in GridIndex::tiles_in_ring(r) {
                store.insert(Tile::new(
                    id,
                    Heightmap::new(8, 8),
                    vec![0.5; 64],
                    vec![Biome::Plains; 64],
                ));
            }
        }
        store.grid_mut().set_max_ring(ring);
        store
    }

    fn clean_all(store: &mut HeightFieldStore) {
        for id in store.tile_ids() {
            store.tile_mut(id).unwrap().hydrology.status = HydroStatus::Clean;
        }
    }

    #[test]
    fn set_sample_clamps_to_range() {
        let mut store = store_with_ring(0);
        let written = store
            .set_sample(TileId::ORIGIN, LocalCoord::new(3, 3), 1.0e9)
            .unwrap();
        assert_eq!(written, 5000.0);
        assert_eq!(
            store.sample(TileId::ORIGIN, LocalCoord::new(3, 3)).unwrap(),
            5000.0
        );
        assert!(store
            .set_sample(TileId::ORIGIN, LocalCoord::new(3, 3), f32::NAN)
            .is_err());
    }

    #[test]
    fn interior_write_marks_only_own_tile() {
        let mut store = store_with_ring(1);
        clean_all(&mut store);
        store
            .set_sample(TileId::ORIGIN, LocalCoord::new(4, 4), 10.0)
            .unwrap();
        assert_eq!(store.dirty_tiles(), vec![TileId::ORIGIN]);
    }

    #[test]
    fn corner_write_marks_adjacent_tiles() {
        let mut store = store_with_ring(1);
        clean_all(&mut store);
        store
            .set_sample(TileId::ORIGIN, LocalCoord::new(0, 0), 10.0)
            .unwrap();
        let dirty = store.dirty_tiles();
        assert_eq!(dirty.len(), 4);
        assert!(dirty.contains(&TileId::new(-1, -1)));
        assert!(dirty.contains(&TileId::new(-1, 0)));
        assert!(dirty.contains(&TileId::new(0, -1)));
    }

    #[test]
    fn missing_tile_is_reported() {
        let mut store = store_with_ring(0);
        let err = store.mark_dirty(TileId::new(1, 0)).unwrap_err();
        assert!(matches!(err, MapError::TileNotFound(_)));
        assert!(store.sample(TileId::new(5, 5), LocalCoord::new(0, 0)).is_err());
        assert!(store.sample(TileId::ORIGIN, LocalCoord::new(8, 0)).is_err());
    }

    #[test]
    fn write_reclassifies_biome() {
        let mut store = store_with_ring(0);
        store
            .set_sample(TileId::ORIGIN, LocalCoord::new(1, 1), 1900.0)
            .unwrap();
        assert_eq!(
            store.biome_at(SampleCoord::new(1, 1)),
            Some(Biome::Mountains)
        );
    }
}
