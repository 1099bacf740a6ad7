// src/config.rs
//! Конфигурация движка карты мира
//!
//! Этот модуль определяет все параметры, управляющие генерацией и редактированием мира:
//! - Размер тайла, шаг сэмплов и допустимый диапазон высот
//! - Параметры шумовой генерации рельефа и влажности
//! - Гидрология: заполнение впадин, пороги рек и распространение пересчёта
//! - Кисти, размещение поселений и квестовых точек, маршрутизация дорог
//!
//! Все структуры поддерживают сериализацию в TOML/JSON для удобной настройки через конфигурационные файлы.
//! Каждое поле имеет значение по умолчанию, поэтому в файле достаточно указать только отличия.

use crate::error::{MapError, Result};
use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Параметры шумовой генерации рельефа
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSettings {
    /// Количество октав шума (частота удваивается, амплитуда уменьшается вдвое на каждой)
    #[serde(default = "default_octaves")]
    pub octaves: u32,

    /// Частота первой октавы в циклах на сэмпл
    #[serde(default = "default_base_frequency")]
    pub base_frequency: f32,

    /// Высота нижней границы генерируемого рельефа (м)
    #[serde(default = "default_elevation_floor")]
    pub elevation_floor: f32,

    /// Перепад высот генерируемого рельефа (м): нормированная высота 1.0 = `floor + scale`
    #[serde(default = "default_height_scale")]
    pub height_scale: f32,

    /// Степень нелинейности высоты:
    /// - `<1.0` → больше возвышенностей,
    /// - `=1.0` → линейно,
    /// - `>1.0` → больше равнин и резкие пики.
    #[serde(default = "default_elevation_power")]
    pub elevation_power: f32,

    /// Амплитуда посэмпловой шероховатости (м), детерминированной по сиду и тайлу
    #[serde(default = "default_roughness")]
    pub roughness: f32,

    /// Частота независимого канала влажности
    #[serde(default = "default_moisture_frequency")]
    pub moisture_frequency: f32,
}

fn default_octaves() -> u32 {
    5
}
fn default_base_frequency() -> f32 {
    0.004
}
fn default_elevation_floor() -> f32 {
    0.0
}
fn default_height_scale() -> f32 {
    2000.0
}
fn default_elevation_power() -> f32 {
    1.2
}
fn default_roughness() -> f32 {
    0.3
}
fn default_moisture_frequency() -> f32 {
    0.006
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            octaves: default_octaves(),
            base_frequency: default_base_frequency(),
            elevation_floor: default_elevation_floor(),
            height_scale: default_height_scale(),
            elevation_power: default_elevation_power(),
            roughness: default_roughness(),
            moisture_frequency: default_moisture_frequency(),
        }
    }
}

/// Параметры гидрологии
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HydrologySettings {
    /// Максимум итераций заполнения впадин; при исчерпании выдаётся предупреждение `UnstableHydrology`
    #[serde(default = "default_max_fill_iterations")]
    pub max_fill_iterations: u32,

    /// Минимальный уклон (м на шаг), который заполнение оставляет на плоских участках
    #[serde(default = "default_fill_epsilon")]
    pub fill_epsilon: f32,

    /// Глубина распространения пересчёта вниз по течению (в тайлах).
    /// `None`: радиус мира (текущее максимальное кольцо, минимум 1).
    #[serde(default)]
    pub propagation_depth: Option<u32>,

    /// Накопленный поток, начиная с которого сэмпл считается источником пресной воды
    #[serde(default = "default_fresh_water_threshold")]
    pub fresh_water_threshold: f32,

    /// Накопленный поток, начиная с которого сэмпл считается рекой (нужен мост)
    #[serde(default = "default_river_threshold")]
    pub river_threshold: f32,

    /// Минимальная глубина заполнения (м), при которой сэмпл помечается как озеро
    #[serde(default = "default_lake_min_depth")]
    pub lake_min_depth: f32,

    /// Максимум проходов обновления всех грязных тайлов
    #[serde(default = "default_refresh_pass_cap")]
    pub refresh_pass_cap: u32,
}

fn default_max_fill_iterations() -> u32 {
    8
}
fn default_fill_epsilon() -> f32 {
    1e-3
}
fn default_fresh_water_threshold() -> f32 {
    40.0
}
fn default_river_threshold() -> f32 {
    150.0
}
fn default_lake_min_depth() -> f32 {
    0.25
}
fn default_refresh_pass_cap() -> u32 {
    32
}

impl Default for HydrologySettings {
    fn default() -> Self {
        Self {
            max_fill_iterations: default_max_fill_iterations(),
            fill_epsilon: default_fill_epsilon(),
            propagation_depth: None,
            fresh_water_threshold: default_fresh_water_threshold(),
            river_threshold: default_river_threshold(),
            lake_min_depth: default_lake_min_depth(),
            refresh_pass_cap: default_refresh_pass_cap(),
        }
    }
}

/// Параметры кистей
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrushSettings {
    /// Крутизна гауссова спада: `w = exp(-(d/r)^2 * k)`
    #[serde(default = "default_gaussian_k")]
    pub gaussian_k: f32,

    /// Шаг террасы на единицу силы кисти (м)
    #[serde(default = "default_terrace_step_scale")]
    pub terrace_step_scale: f32,

    /// Минимальный шаг террасы (м)
    #[serde(default = "default_min_terrace_step")]
    pub min_terrace_step: f32,
}

fn default_gaussian_k() -> f32 {
    2.5
}
fn default_terrace_step_scale() -> f32 {
    10.0
}
fn default_min_terrace_step() -> f32 {
    1.0
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            gaussian_k: default_gaussian_k(),
            terrace_step_scale: default_terrace_step_scale(),
            min_terrace_step: default_min_terrace_step(),
        }
    }
}

/// Параметры оценки мест для поселений и квестовых точек
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementSettings {
    /// Вес пологого рельефа в оценке поселения
    #[serde(default = "default_slope_weight")]
    pub slope_weight: f32,

    /// Вес близости пресной воды в оценке поселения
    #[serde(default = "default_water_weight")]
    pub water_weight: f32,

    /// Вес попадания в пригодный для жизни диапазон высот
    #[serde(default = "default_band_weight")]
    pub band_weight: f32,

    /// Уклон (подъём/расстояние), при котором оценка пологости падает до нуля
    #[serde(default = "default_max_livable_slope")]
    pub max_livable_slope: f32,

    /// Дальность (км), на которой близость воды перестаёт давать бонус
    #[serde(default = "default_water_reach_km")]
    pub water_reach_km: f32,

    /// Нижняя граница пригодных высот (м)
    #[serde(default = "default_livable_min")]
    pub livable_min: f32,

    /// Верхняя граница пригодных высот (м)
    #[serde(default = "default_livable_max")]
    pub livable_max: f32,

    /// Расстояние за пределами диапазона (м), на котором оценка высоты падает до нуля
    #[serde(default = "default_band_falloff")]
    pub band_falloff: f32,

    /// Минимальная оценка, при которой поселение может быть привязано к месту
    #[serde(default = "default_min_settlement_score")]
    pub min_settlement_score: f32,

    /// Вес близости к якорю в оценке квестовой точки
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f32,

    /// Вес совпадения биома в оценке квестовой точки
    #[serde(default = "default_biome_weight")]
    pub biome_weight: f32,

    /// Вес рельефного бонуса типа точки (холм для святилища, скалы для логова и т.д.)
    #[serde(default = "default_terrain_weight")]
    pub terrain_weight: f32,

    /// Превышение над окрестностью (м), дающее полный бонус «вершины»
    #[serde(default = "default_prominence_scale")]
    pub prominence_scale: f32,

    /// Минимальное расстояние (км) между предложенными квестовыми точками;
    /// 0 отключает прореживание
    #[serde(default = "default_min_quest_spacing_km")]
    pub min_quest_spacing_km: f32,

    /// Минимальный вклад слагаемого, попадающего в список причин
    #[serde(default = "default_reason_threshold")]
    pub reason_threshold: f32,
}

fn default_slope_weight() -> f32 {
    0.4
}
fn default_water_weight() -> f32 {
    0.35
}
fn default_band_weight() -> f32 {
    0.25
}
fn default_max_livable_slope() -> f32 {
    0.25
}
fn default_water_reach_km() -> f32 {
    3.0
}
fn default_livable_min() -> f32 {
    0.0
}
fn default_livable_max() -> f32 {
    1200.0
}
fn default_band_falloff() -> f32 {
    400.0
}
fn default_min_settlement_score() -> f32 {
    0.45
}
fn default_distance_weight() -> f32 {
    0.35
}
fn default_biome_weight() -> f32 {
    0.25
}
fn default_terrain_weight() -> f32 {
    0.4
}
fn default_prominence_scale() -> f32 {
    40.0
}
fn default_min_quest_spacing_km() -> f32 {
    0.0
}
fn default_reason_threshold() -> f32 {
    0.1
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            slope_weight: default_slope_weight(),
            water_weight: default_water_weight(),
            band_weight: default_band_weight(),
            max_livable_slope: default_max_livable_slope(),
            water_reach_km: default_water_reach_km(),
            livable_min: default_livable_min(),
            livable_max: default_livable_max(),
            band_falloff: default_band_falloff(),
            min_settlement_score: default_min_settlement_score(),
            distance_weight: default_distance_weight(),
            biome_weight: default_biome_weight(),
            terrain_weight: default_terrain_weight(),
            prominence_scale: default_prominence_scale(),
            min_quest_spacing_km: default_min_quest_spacing_km(),
            reason_threshold: default_reason_threshold(),
        }
    }
}

/// Параметры стоимости дорог
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoadSettings {
    /// Штраф за уклон у средневекового профиля (идёт по горизонталям)
    #[serde(default = "default_medieval_slope_weight")]
    pub medieval_slope_weight: f32,

    /// Штраф за уклон у римского профиля
    #[serde(default = "default_roman_slope_weight")]
    pub roman_slope_weight: f32,

    /// Добавочная стоимость (км) за каждый поворот на 45° у римского профиля
    #[serde(default = "default_roman_turn_penalty_km")]
    pub roman_turn_penalty_km: f32,

    /// Фиксированная стоимость (км) захода на речной сэмпл
    #[serde(default = "default_bridge_cost_km")]
    pub bridge_cost_km: f32,

    /// Множитель стоимости для сэмплов озёр
    #[serde(default = "default_lake_multiplier")]
    pub lake_multiplier: f32,
}

fn default_medieval_slope_weight() -> f32 {
    8.0
}
fn default_roman_slope_weight() -> f32 {
    20.0
}
fn default_roman_turn_penalty_km() -> f32 {
    0.25
}
fn default_bridge_cost_km() -> f32 {
    1.5
}
fn default_lake_multiplier() -> f32 {
    6.0
}

impl Default for RoadSettings {
    fn default() -> Self {
        Self {
            medieval_slope_weight: default_medieval_slope_weight(),
            roman_slope_weight: default_roman_slope_weight(),
            roman_turn_penalty_km: default_roman_turn_penalty_km(),
            bridge_cost_km: default_bridge_cost_km(),
            lake_multiplier: default_lake_multiplier(),
        }
    }
}

/// Основные параметры движка
///
/// Полная конфигурация одного мира. Поддерживает загрузку из TOML-файлов.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Сторона тайла в сэмплах (по умолчанию 64)
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,

    /// Расстояние между соседними сэмплами в километрах
    #[serde(default = "default_km_per_sample")]
    pub km_per_sample: f32,

    /// Нижняя допустимая высота (м)
    #[serde(default = "default_min_elevation")]
    pub min_elevation: f32,

    /// Верхняя допустимая высота (м)
    #[serde(default = "default_max_elevation")]
    pub max_elevation: f32,

    /// Географические координаты сэмпла `(0, 0)`
    #[serde(default)]
    pub origin: GeoPoint,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub hydrology: HydrologySettings,

    #[serde(default)]
    pub brush: BrushSettings,

    #[serde(default)]
    pub placement: PlacementSettings,

    #[serde(default)]
    pub roads: RoadSettings,
}

fn default_tile_size() -> u32 {
    64
}
fn default_km_per_sample() -> f32 {
    0.5
}
fn default_min_elevation() -> f32 {
    -1000.0
}
fn default_max_elevation() -> f32 {
    5000.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            km_per_sample: default_km_per_sample(),
            min_elevation: default_min_elevation(),
            max_elevation: default_max_elevation(),
            origin: GeoPoint::default(),
            generation: GenerationSettings::default(),
            hydrology: HydrologySettings::default(),
            brush: BrushSettings::default(),
            placement: PlacementSettings::default(),
            roads: RoadSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Загружает параметры из TOML-файла
    ///
    /// # Пример
    /// ```toml
    /// # world.toml
    /// tile_size = 32
    /// km_per_sample = 0.25
    ///
    /// [hydrology]
    /// river_threshold = 80.0
    /// ```
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Проверяет согласованность параметров
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(MapError::Config(msg));

        if !(4..=1024).contains(&self.tile_size) {
            return fail(format!("tile_size must be in 4..=1024, got {}", self.tile_size));
        }
        if !(self.km_per_sample.is_finite() && self.km_per_sample > 0.0) {
            return fail("km_per_sample must be positive".into());
        }
        if !(self.min_elevation.is_finite()
            && self.max_elevation.is_finite()
            && self.min_elevation < self.max_elevation)
        {
            return fail("min_elevation must be below max_elevation".into());
        }
        if !(1..=12).contains(&self.generation.octaves) {
            return fail("generation.octaves must be in 1..=12".into());
        }
        if self.generation.height_scale <= 0.0 || self.generation.elevation_power <= 0.0 {
            return fail("generation.height_scale and elevation_power must be positive".into());
        }
        if self.generation.roughness < 0.0 {
            return fail("generation.roughness must be non-negative".into());
        }
        let hydro = &self.hydrology;
        if hydro.fill_epsilon <= 0.0 {
            return fail("hydrology.fill_epsilon must be positive".into());
        }
        if hydro.fresh_water_threshold < 1.0 || hydro.river_threshold < 1.0 {
            return fail("hydrology thresholds are counts of samples and must be >= 1".into());
        }
        if self.placement.livable_min > self.placement.livable_max {
            return fail("placement.livable_min must not exceed livable_max".into());
        }
        if self.placement.max_livable_slope <= 0.0 || self.placement.water_reach_km <= 0.0 {
            return fail("placement.max_livable_slope and water_reach_km must be positive".into());
        }
        let spacing = self.placement.min_quest_spacing_km;
        if spacing.is_nan() || spacing < 0.0 {
            return fail("placement.min_quest_spacing_km must be non-negative".into());
        }
        if self.roads.lake_multiplier < 1.0 || self.roads.bridge_cost_km < 0.0 {
            return fail("roads.lake_multiplier must be >= 1 and bridge_cost_km >= 0".into());
        }
        Ok(())
    }
}
