// src/poi.rs
//! Точки интереса: поселения и места для квестов
//!
//! Поселение ставится в запрошенную точку или «притягивается» к лучшему сэмплу
//! в радиусе, зависящем от типа: пологий склон, близость пресной воды и
//! пригодный для жизни диапазон высот.
//!
//! Места для квестов только предлагаются (в реестр не попадают): кандидаты вокруг
//! центра тайла ранжируются по расстоянию, биому и рельефу, характерному для типа.

use crate::biome::Biome;
use crate::config::{EngineConfig, HydrologySettings, PlacementSettings};
use crate::error::{MapError, Result};
use crate::generator::derive_hash;
use crate::geo::{GeoPoint, Projection};
use crate::grid::{Dir8, SampleCoord, TileId};
use crate::store::HeightFieldStore;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

const POI_SALT: u64 = 0x706f_69;
const ID_ALPHABET_RADIX: u32 = 36;
const ID_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
    Hamlet,
    Village,
    #[default]
    Town,
    City,
}

impl SettlementKind {
    /// Радиус поиска места при привязке, км
    #[must_use]
    pub fn snap_radius_km(self) -> f32 {
        match self {
            SettlementKind::Hamlet => 1.0,
            SettlementKind::Village => 2.0,
            SettlementKind::Town => 4.0,
            SettlementKind::City => 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestKind {
    #[default]
    Ruin,
    Shrine,
    Lair,
    Portal,
    Landmark,
}

impl QuestKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            QuestKind::Ruin => "ruin",
            QuestKind::Shrine => "shrine",
            QuestKind::Lair => "lair",
            QuestKind::Portal => "portal",
            QuestKind::Landmark => "landmark",
        }
    }

    /// Биомы, в которых такое место выглядит уместно
    #[must_use]
    pub fn affinity(self) -> &'static [Biome] {
        match self {
            QuestKind::Ruin => &[Biome::Plains, Biome::Forest, Biome::Desert],
            QuestKind::Shrine => &[Biome::Hills, Biome::Mountains, Biome::Forest],
            QuestKind::Lair => &[Biome::Mountains, Biome::Swamp, Biome::Forest],
            QuestKind::Portal => &[Biome::Plains, Biome::Desert, Biome::Swamp],
            QuestKind::Landmark => &[Biome::Mountains, Biome::Hills],
        }
    }
}

impl fmt::Display for QuestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum PoiKind {
    Settlement {
        subtype: SettlementKind,
        walls: bool,
        score: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Poi {
    pub id: String,
    #[serde(flatten)]
    pub kind: PoiKind,
    pub sample: SampleCoord,
    pub loc: GeoPoint,
}

impl Poi {
    #[must_use]
    pub fn is_settlement(&self) -> bool {
        matches!(self.kind, PoiKind::Settlement { .. })
    }
}

/// Реестр точек интереса мира; идентификаторы выдаются из ChaCha, засеянного сидом мира
#[derive(Debug, Clone)]
pub struct PoiRegistry {
    pois: BTreeMap<String, Poi>,
    rng: ChaCha8Rng,
}

impl PoiRegistry {
    #[must_use]
    pub fn new(seed_hash: u64) -> Self {
        Self {
            pois: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(derive_hash(seed_hash, POI_SALT)),
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        loop {
            let suffix: String = (0..ID_LENGTH)
                .map(|_| {
                    let digit = self.rng.gen_range(0..ID_ALPHABET_RADIX);
                    char::from_digit(digit, ID_ALPHABET_RADIX).unwrap_or('0')
                })
                .collect();
            let id = format!("{prefix}:{suffix}");
            if !self.pois.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<&Poi> {
        self.pois
            .get(id)
            .ok_or_else(|| MapError::PoiNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Poi> {
        self.pois.values()
    }

    pub fn settlements(&self) -> impl Iterator<Item = &Poi> {
        self.pois.values().filter(|p| p.is_settlement())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pois.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOptions {
    #[serde(default = "default_snap")]
    pub snap: bool,
    #[serde(default)]
    pub walls: bool,
}

fn default_snap() -> bool {
    true
}

impl Default for SettlementOptions {
    fn default() -> Self {
        Self {
            snap: default_snap(),
            walls: false,
        }
    }
}

/// Окно `[min - reach, max + reach]`, обрезанное границами сгенерированного мира
fn clipped_window(
    store: &HeightFieldStore,
    min: SampleCoord,
    max: SampleCoord,
    reach: i32,
) -> (SampleCoord, SampleCoord) {
    let (world_min, world_max) = store.grid().sample_bounds();
    (
        SampleCoord::new(
            min.x.saturating_sub(reach).max(world_min.x),
            min.y.saturating_sub(reach).max(world_min.y),
        ),
        SampleCoord::new(
            max.x.saturating_add(reach).min(world_max.x),
            max.y.saturating_add(reach).min(world_max.y),
        ),
    )
}

/// Окно расстояний до пресной воды (в шагах 8-связной решётки)
struct WaterField {
    min: SampleCoord,
    width: usize,
    height: usize,
    steps: Vec<Option<u32>>,
}

impl WaterField {
    /// Многоисточниковый обход в ширину от всех водных сэмплов окна
    fn build(store: &HeightFieldStore, min: SampleCoord, max: SampleCoord, threshold: f32) -> Self {
        let width = (max.x - min.x + 1).max(0) as usize;
        let height = (max.y - min.y + 1).max(0) as usize;
        let mut steps = vec![None; width * height];
        let mut queue = VecDeque::new();

        for y in 0..height {
            for x in 0..width {
                let s = SampleCoord::new(min.x + x as i32, min.y + y as i32);
                if is_fresh_water(store, s, threshold) {
                    steps[y * width + x] = Some(0);
                    queue.push_back((x, y));
                }
            }
        }

        while let Some((x, y)) = queue.pop_front() {
            let next = steps[y * width + x].map_or(0, |d| d + 1);
            for dir in Dir8::ALL {
                let (dx, dy) = dir.offset();
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                    continue;
                }
                let idx = ny as usize * width + nx as usize;
                if steps[idx].is_none() {
                    steps[idx] = Some(next);
                    queue.push_back((nx as usize, ny as usize));
                }
            }
        }

        Self {
            min,
            width,
            height,
            steps,
        }
    }

    fn steps_at(&self, s: SampleCoord) -> Option<u32> {
        let x = s.x - self.min.x;
        let y = s.y - self.min.y;
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        self.steps[y as usize * self.width + x as usize]
    }
}

fn is_fresh_water(store: &HeightFieldStore, s: SampleCoord, threshold: f32) -> bool {
    store.is_lake_at(s) || store.accumulation_at(s).is_some_and(|a| a >= threshold)
}

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Общие входные данные оценки сэмплов
struct SiteScorer<'a> {
    store: &'a HeightFieldStore,
    projection: &'a Projection,
    settings: &'a PlacementSettings,
    water: WaterField,
}

impl<'a> SiteScorer<'a> {
    fn new(
        store: &'a HeightFieldStore,
        projection: &'a Projection,
        settings: &'a PlacementSettings,
        hydrology: &HydrologySettings,
        min: SampleCoord,
        max: SampleCoord,
    ) -> Self {
        // окно расширено на дальность воды, чтобы река сразу за границей поиска учитывалась
        let reach = projection.samples_for_km(settings.water_reach_km);
        let (lo, hi) = clipped_window(store, min, max, reach);
        let water = WaterField::build(store, lo, hi, hydrology.fresh_water_threshold);
        Self {
            store,
            projection,
            settings,
            water,
        }
    }

    fn slope(&self, s: SampleCoord) -> f32 {
        self.store
            .slope_at(s, self.projection.km_per_sample())
            .unwrap_or(0.0)
    }

    fn flatness(&self, s: SampleCoord) -> f32 {
        1.0 - clamp01(self.slope(s) / self.settings.max_livable_slope)
    }

    fn water_proximity(&self, s: SampleCoord) -> f32 {
        self.water.steps_at(s).map_or(0.0, |steps| {
            let km = steps as f32 * self.projection.km_per_sample();
            1.0 - clamp01(km / self.settings.water_reach_km)
        })
    }

    fn elevation_band(&self, elevation: f32) -> f32 {
        let s = self.settings;
        let outside = if elevation < s.livable_min {
            s.livable_min - elevation
        } else if elevation > s.livable_max {
            elevation - s.livable_max
        } else {
            0.0
        };
        1.0 - clamp01(outside / s.band_falloff.max(f32::EPSILON))
    }

    fn settlement_score(&self, s: SampleCoord, elevation: f32) -> f32 {
        let w = self.settings;
        w.slope_weight * self.flatness(s)
            + w.water_weight * self.water_proximity(s)
            + w.band_weight * self.elevation_band(elevation)
    }

    /// Превышение над средним 5×5 окружением
    fn prominence(&self, s: SampleCoord, elevation: f32) -> f32 {
        let mut sum = 0.0;
        let mut count = 0;
        for dy in -2..=2 {
            for dx in -2..=2 {
                if let Some(h) = self.store.elevation_at(SampleCoord::new(s.x + dx, s.y + dy)) {
                    sum += h;
                    count += 1;
                }
            }
        }
        let mean = sum / count.max(1) as f32;
        clamp01((elevation - mean) / self.settings.prominence_scale)
    }

    fn terrain_bonus(&self, kind: QuestKind, s: SampleCoord, elevation: f32) -> f32 {
        match kind {
            QuestKind::Shrine | QuestKind::Landmark => self.prominence(s, elevation),
            QuestKind::Lair => clamp01(self.slope(s) / self.settings.max_livable_slope),
            QuestKind::Ruin => self.water_proximity(s),
            QuestKind::Portal => self.flatness(s),
        }
    }
}

/// Ставит поселение в `loc` (с привязкой к лучшему месту, если `options.snap`)
pub fn place_settlement(
    store: &HeightFieldStore,
    registry: &mut PoiRegistry,
    subtype: SettlementKind,
    loc: GeoPoint,
    options: SettlementOptions,
    config: &EngineConfig,
) -> Result<Poi> {
    let projection = &Projection::new(config.origin, config.km_per_sample);
    let (hydrology, settings) = (&config.hydrology, &config.placement);
    if !(loc.lat.is_finite() && loc.lon.is_finite()) {
        return Err(MapError::Validation("settlement location must be finite".into()));
    }
    let requested = projection.to_sample(loc);
    if !store.contains_sample(requested) {
        return Err(MapError::OutOfBounds(requested));
    }

    let radius_km = subtype.snap_radius_km();
    let reach = if options.snap {
        projection.samples_for_km(radius_km)
    } else {
        0
    };
    let (min, max) = clipped_window(store, requested, requested, reach);
    let scorer = SiteScorer::new(store, projection, settings, hydrology, min, max);

    let (sample, score) = if options.snap {
        let mut best: Option<(SampleCoord, f32)> = None;
        for gy in min.y..=max.y {
            for gx in min.x..=max.x {
                let s = SampleCoord::new(gx, gy);
                if projection.distance_km(requested, s) > radius_km {
                    continue;
                }
                let Some(elevation) = store.elevation_at(s) else {
                    continue;
                };
                if is_fresh_water(store, s, hydrology.fresh_water_threshold) {
                    continue;
                }
                let score = scorer.settlement_score(s, elevation);
                // строгое `>`: при равенстве остаётся первый в порядке обхода
                if best.is_none_or(|(_, b)| score > b) {
                    best = Some((s, score));
                }
            }
        }
        match best {
            Some((s, score)) if score >= settings.min_settlement_score => (s, score),
            other => {
                let best_score = other.map_or(0.0, |(_, score)| score);
                tracing::debug!(
                    ?subtype,
                    radius_km,
                    best_score,
                    "no settlement site above threshold"
                );
                return Err(MapError::NoSuitableSite {
                    radius_km,
                    best_score,
                });
            }
        }
    } else {
        let elevation = store
            .elevation_at(requested)
            .ok_or(MapError::OutOfBounds(requested))?;
        (requested, scorer.settlement_score(requested, elevation))
    };

    let poi = Poi {
        id: registry.next_id("settlement"),
        kind: PoiKind::Settlement {
            subtype,
            walls: options.walls,
            score,
        },
        sample,
        loc: projection.to_geo(sample),
    };
    registry.pois.insert(poi.id.clone(), poi.clone());

    tracing::info!(
        id = %poi.id,
        ?subtype,
        sample = %sample,
        score,
        snapped = sample != requested,
        "settlement placed"
    );
    Ok(poi)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestQuery {
    pub kind: QuestKind,
    pub near: TileId,
    pub within_km: f32,
    pub avoid_settlements_km: f32,
    pub biomes: Option<Vec<Biome>>,
    pub n: usize,
}

impl QuestQuery {
    pub fn validate(&self) -> Result<()> {
        if !(self.within_km.is_finite() && self.within_km > 0.0) {
            return Err(MapError::Validation("within_km must be positive".into()));
        }
        if !(self.avoid_settlements_km.is_finite() && self.avoid_settlements_km > 0.0) {
            return Err(MapError::Validation(
                "avoid_settlements_km must be positive".into(),
            ));
        }
        if !(1..=25).contains(&self.n) {
            return Err(MapError::Validation(format!(
                "n must be in 1..=25, got {}",
                self.n
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestSuggestion {
    pub id: String,
    pub kind: QuestKind,
    pub score: f32,
    pub sample: SampleCoord,
    pub loc: GeoPoint,
    pub biome: Biome,
    pub reasons: Vec<String>,
}

/// Предлагает до `query.n` мест для квеста; пустой результат не считается ошибкой
pub fn suggest_quest_sites(
    store: &HeightFieldStore,
    registry: &PoiRegistry,
    query: &QuestQuery,
    config: &EngineConfig,
) -> Result<Vec<QuestSuggestion>> {
    let projection = &Projection::new(config.origin, config.km_per_sample);
    let (hydrology, settings) = (&config.hydrology, &config.placement);
    query.validate()?;
    store.tile(query.near)?;

    let anchor = store.grid().tile_center(query.near);
    // огромный `within_km` насыщает `reach`; окно всё равно не выходит за мир
    let reach = projection.samples_for_km(query.within_km);
    let (min, max) = clipped_window(store, anchor, anchor, reach);
    let scorer = SiteScorer::new(store, projection, settings, hydrology, min, max);
    let settlements: Vec<SampleCoord> = registry.settlements().map(|p| p.sample).collect();

    let mut candidates = Vec::new();
    for gy in min.y..=max.y {
        for gx in min.x..=max.x {
            let s = SampleCoord::new(gx, gy);
            let d_km = projection.distance_km(anchor, s);
            if d_km > query.within_km {
                continue;
            }
            let (Some(elevation), Some(biome)) = (store.elevation_at(s), store.biome_at(s)) else {
                continue;
            };
            if store.is_lake_at(s) {
                continue;
            }
            if settlements
                .iter()
                .any(|&p| projection.distance_km(p, s) <= query.avoid_settlements_km)
            {
                continue;
            }
            if let Some(filter) = &query.biomes {
                if !filter.contains(&biome) {
                    continue;
                }
            }

            let distance_term = settings.distance_weight * (1.0 - d_km / query.within_km);
            let biome_bonus = match &query.biomes {
                Some(_) => 1.0,
                None if query.kind.affinity().contains(&biome) => 1.0,
                None => 0.0,
            };
            let biome_term = settings.biome_weight * biome_bonus;
            let terrain_term =
                settings.terrain_weight * scorer.terrain_bonus(query.kind, s, elevation);

            let mut reasons = Vec::new();
            if distance_term >= settings.reason_threshold {
                reasons.push(format!("{d_km:.1} km from {}", query.near));
            }
            if biome_term >= settings.reason_threshold {
                reasons.push(format!("fitting {biome} terrain"));
            }
            if terrain_term >= settings.reason_threshold {
                reasons.push(
                    match query.kind {
                        QuestKind::Shrine | QuestKind::Landmark => "prominent high ground",
                        QuestKind::Lair => "rugged, broken ground",
                        QuestKind::Ruin => "near fresh water",
                        QuestKind::Portal => "flat open ground",
                    }
                    .to_string(),
                );
            }

            candidates.push(QuestSuggestion {
                id: format!("quest:{}:{}:{}", query.kind, s.x, s.y),
                kind: query.kind,
                score: distance_term + biome_term + terrain_term,
                sample: s,
                loc: projection.to_geo(s),
                biome,
                reasons,
            });
        }
    }

    // устойчивая сортировка: при равенстве сохраняется порядок обхода
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut chosen: Vec<QuestSuggestion> = Vec::with_capacity(query.n);
    for candidate in candidates {
        if chosen.len() == query.n {
            break;
        }
        let crowded = chosen.iter().any(|c| {
            projection.distance_km(c.sample, candidate.sample) < settings.min_quest_spacing_km
        });
        if !crowded {
            chosen.push(candidate);
        }
    }

    tracing::debug!(
        kind = %query.kind,
        near = %query.near,
        found = chosen.len(),
        requested = query.n,
        "quest sites suggested"
    );
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::generator::WorldGenerator;
    use crate::hydrology;

    struct Fixture {
        store: HeightFieldStore,
        projection: Projection,
        config: EngineConfig,
    }

    /// Мир из 9 тайлов 16×16 с долиной вдоль x = 4, стекающей на юг
    fn valley() -> Fixture {
        let config = EngineConfig {
            tile_size: 16,
            ..EngineConfig::default()
        };
        let generator = WorldGenerator::new("valley", &config).unwrap();
        let mut store = HeightFieldStore::new(&config);
        for ring in 0..=1 {
            for tile in generator.generate_ring(ring) {
                store.insert(tile);
            }
        }
        store.grid_mut().set_max_ring(1);
        let grid = store.grid().clone();
        for id in store.tile_ids() {
            let tile = store.tile_mut(id).unwrap();
            for idx in 0..tile.elevation.data.len() {
                let s = grid.join(id, tile.local(idx));
                tile.elevation.data[idx] = 100.0 + 0.5 * s.y as f32 + 2.0 * (s.x - 4).abs() as f32;
            }
        }
        hydrology::refresh(&mut store, &config.hydrology).unwrap();
        let projection = Projection::new(config.origin, config.km_per_sample);
        Fixture {
            store,
            projection,
            config,
        }
    }

    fn place(
        f: &Fixture,
        registry: &mut PoiRegistry,
        at: SampleCoord,
        snap: bool,
    ) -> Result<Poi> {
        place_settlement(
            &f.store,
            registry,
            SettlementKind::Town,
            f.projection.to_geo(at),
            SettlementOptions { snap, walls: true },
            &f.config,
        )
    }

    fn query(near: TileId, within_km: f32, n: usize) -> QuestQuery {
        QuestQuery {
            kind: QuestKind::Ruin,
            near,
            within_km,
            avoid_settlements_km: 3.0,
            biomes: None,
            n,
        }
    }

    #[test]
    fn snapped_settlement_sits_beside_water() {
        let f = valley();
        let mut registry = PoiRegistry::new(1);
        let poi = place(&f, &mut registry, SampleCoord::new(8, 8), true).unwrap();

        let threshold = f.config.hydrology.fresh_water_threshold;
        assert!(!is_fresh_water(&f.store, poi.sample, threshold));
        assert!(
            Dir8::ALL
                .iter()
                .any(|&d| is_fresh_water(&f.store, poi.sample.step(d), threshold)),
            "settlement at {} is not next to water",
            poi.sample
        );
        assert!(f.projection.distance_km(SampleCoord::new(8, 8), poi.sample) <= 4.0);
        let PoiKind::Settlement { score, walls, .. } = poi.kind;
        assert!(score >= f.config.placement.min_settlement_score);
        assert!(walls);
        assert!(poi.id.starts_with("settlement:"));
        assert_eq!(poi.id.len(), "settlement:".len() + 6);
        assert_eq!(registry.get(&poi.id).unwrap(), &poi);
    }

    #[test]
    fn unsnapped_settlement_keeps_requested_sample() {
        let f = valley();
        let mut registry = PoiRegistry::new(1);
        let poi = place(&f, &mut registry, SampleCoord::new(12, -3), false).unwrap();
        assert_eq!(poi.sample, SampleCoord::new(12, -3));
    }

    #[test]
    fn settlement_outside_world_is_rejected() {
        let f = valley();
        let mut registry = PoiRegistry::new(1);
        let err = place(&f, &mut registry, SampleCoord::new(500, 0), true).unwrap_err();
        assert!(matches!(err, MapError::OutOfBounds(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn hostile_terrain_has_no_suitable_site() {
        let mut f = valley();
        for id in f.store.tile_ids() {
            f.store.fill_tile(id, 3000.0).unwrap();
        }
        f.config.hydrology.fresh_water_threshold = 1.0e6;
        hydrology::refresh(&mut f.store, &f.config.hydrology).unwrap();
        let mut registry = PoiRegistry::new(1);
        let err = place(&f, &mut registry, SampleCoord::new(8, 8), true).unwrap_err();
        match err {
            MapError::NoSuitableSite { best_score, .. } => {
                assert!(best_score < f.config.placement.min_settlement_score);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn ids_are_unique_and_seeded() {
        let f = valley();
        let mut a = PoiRegistry::new(7);
        let mut b = PoiRegistry::new(7);
        let mut ids = Vec::new();
        for x in [0, 10, 20] {
            let pa = place(&f, &mut a, SampleCoord::new(x, 0), false).unwrap();
            let pb = place(&f, &mut b, SampleCoord::new(x, 0), false).unwrap();
            assert_eq!(pa.id, pb.id);
            ids.push(pa.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert_eq!(a.settlements().count(), 3);
    }

    #[test]
    fn quest_sites_respect_distance_constraints() {
        let f = valley();
        let mut registry = PoiRegistry::new(3);
        let town = place(&f, &mut registry, SampleCoord::new(8, 8), false).unwrap();
        let q = query(TileId::ORIGIN, 6.0, 10);
        let sites = suggest_quest_sites(&f.store, &registry, &q, &f.config).unwrap();
        assert_eq!(sites.len(), 10);

        let anchor = f.store.grid().tile_center(TileId::ORIGIN);
        for site in &sites {
            assert!(f.projection.distance_km(anchor, site.sample) <= 6.0);
            assert!(f.projection.distance_km(town.sample, site.sample) > 3.0);
            assert!(site.id.starts_with("quest:ruin:"));
        }
        for pair in sites.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn spacing_is_applied_only_when_configured() {
        let mut f = valley();
        let registry = PoiRegistry::new(3);
        let q = query(TileId::ORIGIN, 6.0, 10);
        let dense = suggest_quest_sites(&f.store, &registry, &q, &f.config).unwrap();
        let close = |a: &QuestSuggestion, b: &QuestSuggestion| {
            f.projection.distance_km(a.sample, b.sample) < 1.0
        };
        assert!(
            dense
                .iter()
                .enumerate()
                .any(|(i, a)| dense[i + 1..].iter().any(|b| close(a, b)))
        );

        f.config.placement.min_quest_spacing_km = 1.0;
        let spaced = suggest_quest_sites(&f.store, &registry, &q, &f.config).unwrap();
        for (i, a) in spaced.iter().enumerate() {
            for b in &spaced[i + 1..] {
                assert!(f.projection.distance_km(a.sample, b.sample) >= 1.0);
            }
        }
    }

    #[test]
    fn few_candidates_yield_fewer_results() {
        let f = valley();
        let registry = PoiRegistry::new(3);
        // в диск 0.6 км попадают центр и четыре прямых соседа
        let q = query(TileId::ORIGIN, 0.6, 8);
        let sites = suggest_quest_sites(&f.store, &registry, &q, &f.config).unwrap();
        assert_eq!(sites.len(), 5);
        let anchor = f.store.grid().tile_center(TileId::ORIGIN);
        for site in &sites {
            assert!(f.projection.distance_km(anchor, site.sample) <= 0.6);
        }
    }

    #[test]
    fn enough_candidates_yield_top_n() {
        let f = valley();
        let registry = PoiRegistry::new(3);
        let (wide, narrow) = (query(TileId::ORIGIN, 0.6, 8), query(TileId::ORIGIN, 0.6, 3));
        let all = suggest_quest_sites(&f.store, &registry, &wide, &f.config).unwrap();
        let top = suggest_quest_sites(&f.store, &registry, &narrow, &f.config).unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[..], all[..3]);
    }

    #[test]
    fn huge_search_radius_is_clipped_to_world() {
        let f = valley();
        let registry = PoiRegistry::new(3);
        let q = query(TileId::ORIGIN, 1.0e10, 5);
        let sites = suggest_quest_sites(&f.store, &registry, &q, &f.config).unwrap();
        assert_eq!(sites.len(), 5);
        for site in &sites {
            assert!(f.store.contains_sample(site.sample));
        }
    }

    #[test]
    fn biome_filter_can_empty_the_result() {
        let f = valley();
        let registry = PoiRegistry::new(3);
        let absent = Biome::ALL
            .into_iter()
            .find(|b| f.store.tiles().all(|t| !t.biomes.contains(b)));
        let Some(absent) = absent else {
            // в мире есть все биомы, отсекать нечего
            return;
        };
        let mut q = query(TileId::ORIGIN, 6.0, 5);
        q.biomes = Some(vec![absent]);
        let sites = suggest_quest_sites(&f.store, &registry, &q, &f.config).unwrap();
        assert!(sites.is_empty());
    }

    #[test]
    fn invalid_queries_are_rejected() {
        let f = valley();
        let registry = PoiRegistry::new(3);
        for q in [
            query(TileId::ORIGIN, 6.0, 0),
            query(TileId::ORIGIN, 6.0, 26),
            query(TileId::ORIGIN, -1.0, 5),
        ] {
            let err = suggest_quest_sites(&f.store, &registry, &q, &f.config).unwrap_err();
            assert!(matches!(err, MapError::Validation(_)));
        }
        let far = query(TileId::new(9, 9), 6.0, 5);
        let err = suggest_quest_sites(&f.store, &registry, &far, &f.config).unwrap_err();
        assert!(matches!(err, MapError::TileNotFound(_)));
    }
}
