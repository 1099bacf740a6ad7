// src/style.rs
//! Стили карты и подготовка данных для экспорта
//!
//! Стиль определяет палитру и набор слоёв. Текущий стиль хранится в
//! [`DisplayConfig`] отдельной сессии, глобального состояния нет.
//! Экспорт не растеризует карту: он собирает ячейки рельефа, поселения и дороги
//! внутри рамки, а рисует их клиент.

use crate::biome::Biome;
use crate::config::EngineConfig;
use crate::error::{MapError, Result};
use crate::geo::{GeoPoint, Projection};
use crate::grid::SampleCoord;
use crate::poi::{Poi, PoiRegistry};
use crate::roads::{RoadProfile, RoadRegistry};
use crate::store::HeightFieldStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MapStyle {
    #[default]
    Realistic,
    Atlas,
    Political,
    Hexcrawl,
}

/// Видимые слои стиля
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layers {
    pub terrain: bool,
    pub hillshade: bool,
    pub water: bool,
    pub roads: bool,
    pub settlements: bool,
    pub borders: bool,
    pub hex_grid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub biomes: BTreeMap<Biome, String>,
    pub water: String,
    pub road: String,
    pub settlement: String,
    pub background: String,
}

fn hex([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

fn blend(color: [u8; 3], toward: [u8; 3], t: f32) -> [u8; 3] {
    let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
    [
        mix(color[0], toward[0]),
        mix(color[1], toward[1]),
        mix(color[2], toward[2]),
    ]
}

impl MapStyle {
    #[must_use]
    pub fn layers(self) -> Layers {
        let base = Layers {
            terrain: true,
            hillshade: false,
            water: true,
            roads: true,
            settlements: true,
            borders: false,
            hex_grid: false,
        };
        match self {
            MapStyle::Realistic => Layers {
                hillshade: true,
                ..base
            },
            MapStyle::Atlas => base,
            MapStyle::Political => Layers {
                terrain: false,
                borders: true,
                ..base
            },
            MapStyle::Hexcrawl => Layers {
                hex_grid: true,
                ..base
            },
        }
    }

    #[must_use]
    pub fn palette(self) -> Palette {
        const PARCHMENT: [u8; 3] = [236, 222, 184];
        const PAPER: [u8; 3] = [240, 240, 236];

        let tint = |biome: Biome| {
            let rgb = biome.to_rgb();
            match self {
                MapStyle::Realistic => rgb,
                MapStyle::Atlas => blend(rgb, PARCHMENT, 0.35),
                MapStyle::Political => blend(rgb, PAPER, 0.7),
                MapStyle::Hexcrawl => blend(rgb, [255, 255, 255], 0.15),
            }
        };
        let biomes = Biome::ALL.into_iter().map(|b| (b, hex(tint(b)))).collect();

        let (water, road, settlement, background) = match self {
            MapStyle::Realistic => ([64, 110, 170], [120, 90, 60], [40, 40, 40], [0, 0, 0]),
            MapStyle::Atlas => ([120, 160, 190], [150, 60, 40], [90, 30, 20], PARCHMENT),
            MapStyle::Political => ([150, 190, 220], [90, 90, 90], [20, 20, 20], PAPER),
            MapStyle::Hexcrawl => ([90, 140, 200], [110, 80, 50], [200, 40, 40], [255, 255, 255]),
        };

        Palette {
            biomes,
            water: hex(water),
            road: hex(road),
            settlement: hex(settlement),
            background: hex(background),
        }
    }
}

/// Настройки отображения одной сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayConfig {
    style: MapStyle,
}

impl DisplayConfig {
    #[must_use]
    pub fn style(&self) -> MapStyle {
        self.style
    }

    /// Переключает стиль и возвращает принятый
    pub fn switch_style(&mut self, style: MapStyle) -> MapStyle {
        self.style = style;
        tracing::debug!(?style, "style switched");
        style
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Pdf,
    Vtt,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn validate(&self) -> Result<()> {
        let finite = [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(MapError::Validation("bbox coordinates must be finite".into()));
        }
        if self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(MapError::Validation(
                "bbox must satisfy minLat < maxLat and minLon < maxLon".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, p: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.lat)
            && (self.min_lon..=self.max_lon).contains(&p.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportRequest {
    pub bbox: BoundingBox,
    pub style: MapStyle,
    pub zoom: u8,
    pub format: ExportFormat,
}

impl ExportRequest {
    pub fn validate(&self) -> Result<()> {
        self.bbox.validate()?;
        if !(1..=22).contains(&self.zoom) {
            return Err(MapError::Validation(format!(
                "zoom must be in 1..=22, got {}",
                self.zoom
            )));
        }
        Ok(())
    }

    /// Шаг выборки ячеек в сэмплах: на крупном масштабе каждый сэмпл, на мелком до 64
    #[must_use]
    pub fn stride(&self) -> i32 {
        1 << (12 - i32::from(self.zoom)).clamp(0, 6)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerrainCell {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biome: Option<Biome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadPolyline {
    pub id: String,
    pub profile: RoadProfile,
    /// Отрезки дороги внутри рамки
    pub segments: Vec<Vec<GeoPoint>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBundle {
    pub style: MapStyle,
    pub palette: Palette,
    pub layers: Layers,
    pub format: ExportFormat,
    pub zoom: u8,
    pub stride: i32,
    pub bbox: BoundingBox,
    pub cells: Vec<TerrainCell>,
    pub settlements: Vec<Poi>,
    pub roads: Vec<RoadPolyline>,
}

/// Разбивает ломаную на непрерывные отрезки внутри рамки
fn clip_polyline(points: &[GeoPoint], bbox: &BoundingBox) -> Vec<Vec<GeoPoint>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for &p in points {
        if bbox.contains(p) {
            current.push(p);
        } else if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments.retain(|s| s.len() >= 2);
    segments
}

/// Собирает данные карты игрока внутри рамки
pub fn export_player_map(
    store: &HeightFieldStore,
    pois: &PoiRegistry,
    roads: &RoadRegistry,
    request: &ExportRequest,
    config: &EngineConfig,
) -> Result<ExportBundle> {
    request.validate()?;
    let projection = Projection::new(config.origin, config.km_per_sample);
    let layers = request.style.layers();
    let bbox = request.bbox;
    let stride = request.stride();

    let mut cells = Vec::new();
    if layers.terrain || layers.water {
        let a = projection.to_sample(GeoPoint::new(bbox.min_lat, bbox.min_lon));
        let b = projection.to_sample(GeoPoint::new(bbox.max_lat, bbox.max_lon));
        let (world_min, world_max) = store.grid().sample_bounds();
        // начало выровнено по шагу, чтобы сетка ячеек не «плавала» при сдвиге рамки
        let align = |v: i32| v.div_euclid(stride) * stride;
        let x0 = align(a.x.min(b.x).max(world_min.x));
        let y0 = align(a.y.min(b.y).max(world_min.y));
        let x1 = a.x.max(b.x).min(world_max.x);
        let y1 = a.y.max(b.y).min(world_max.y);
        let river = config.hydrology.river_threshold;

        for y in (y0..=y1).step_by(stride as usize) {
            for x in (x0..=x1).step_by(stride as usize) {
                let s = SampleCoord::new(x, y);
                let loc = projection.to_geo(s);
                if !bbox.contains(loc) {
                    continue;
                }
                let (Some(elevation), Some(biome)) = (store.elevation_at(s), store.biome_at(s))
                else {
                    continue;
                };
                let water = store.is_lake_at(s)
                    || store.accumulation_at(s).is_some_and(|acc| acc >= river);
                cells.push(TerrainCell {
                    lat: loc.lat,
                    lon: loc.lon,
                    elevation: layers.terrain.then_some(elevation),
                    biome: layers.terrain.then_some(biome),
                    water: layers.water.then_some(water),
                });
            }
        }
    }

    let settlements = if layers.settlements {
        pois.settlements()
            .filter(|p| bbox.contains(p.loc))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    let roads = if layers.roads {
        roads
            .current()
            .map(|road| RoadPolyline {
                id: road.id.clone(),
                profile: road.profile,
                segments: clip_polyline(&road.polyline, &bbox),
            })
            .filter(|r| !r.segments.is_empty())
            .collect()
    } else {
        Vec::new()
    };

    tracing::debug!(
        style = ?request.style,
        zoom = request.zoom,
        stride,
        cells = cells.len(),
        settlements = settlements.len(),
        roads = roads.len(),
        "player map exported"
    );

    Ok(ExportBundle {
        style: request.style,
        palette: request.style.palette(),
        layers,
        format: request.format,
        zoom: request.zoom,
        stride,
        bbox,
        cells,
        settlements,
        roads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::WorldGenerator;
    use crate::hydrology;

    fn world() -> (HeightFieldStore, EngineConfig) {
        let config = EngineConfig {
            tile_size: 16,
            ..EngineConfig::default()
        };
        let generator = WorldGenerator::new("style", &config).unwrap();
        let mut store = HeightFieldStore::new(&config);
        for ring in 0..=1 {
            for tile in generator.generate_ring(ring) {
                store.insert(tile);
            }
        }
        store.grid_mut().set_max_ring(1);
        hydrology::refresh(&mut store, &config.hydrology).unwrap();
        (store, config)
    }

    fn bbox_around(config: &EngineConfig, min: SampleCoord, max: SampleCoord) -> BoundingBox {
        let projection = Projection::new(config.origin, config.km_per_sample);
        let lo = projection.to_geo(min);
        let hi = projection.to_geo(max);
        BoundingBox {
            min_lat: lo.lat - 1e-6,
            min_lon: lo.lon - 1e-6,
            max_lat: hi.lat + 1e-6,
            max_lon: hi.lon + 1e-6,
        }
    }

    #[test]
    fn palettes_are_hex_colors_and_differ_by_style() {
        let realistic = MapStyle::Realistic.palette();
        let atlas = MapStyle::Atlas.palette();
        assert_eq!(realistic.biomes.len(), Biome::ALL.len());
        assert_eq!(realistic.biomes[&Biome::Plains], "#96c864");
        for color in realistic.biomes.values().chain([&atlas.water, &atlas.background]) {
            assert_eq!(color.len(), 7);
            assert!(color.starts_with('#'));
            assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert_ne!(realistic, atlas);
        assert!(!MapStyle::Political.layers().terrain);
        assert!(MapStyle::Hexcrawl.layers().hex_grid);
    }

    #[test]
    fn sessions_keep_their_own_style() {
        let mut a = DisplayConfig::default();
        let b = DisplayConfig::default();
        assert_eq!(a.switch_style(MapStyle::Hexcrawl), MapStyle::Hexcrawl);
        assert_eq!(a.style(), MapStyle::Hexcrawl);
        assert_eq!(b.style(), MapStyle::Realistic);
    }

    #[test]
    fn stride_follows_zoom() {
        let bbox = BoundingBox {
            min_lat: 0.0,
            min_lon: 0.0,
            max_lat: 1.0,
            max_lon: 1.0,
        };
        let req = |zoom| ExportRequest {
            bbox,
            style: MapStyle::Atlas,
            zoom,
            format: ExportFormat::Png,
        };
        assert_eq!(req(5).stride(), 64);
        assert_eq!(req(10).stride(), 4);
        assert_eq!(req(12).stride(), 1);
        assert_eq!(req(22).stride(), 1);
        assert!(req(0).validate().is_err());
        assert!(req(23).validate().is_err());
    }

    #[test]
    fn export_stays_inside_bbox() {
        let (store, config) = world();
        let bbox = bbox_around(&config, SampleCoord::new(-4, -4), SampleCoord::new(11, 11));
        let request = ExportRequest {
            bbox,
            style: MapStyle::Atlas,
            zoom: 12,
            format: ExportFormat::Vtt,
        };
        let bundle = export_player_map(
            &store,
            &PoiRegistry::new(0),
            &RoadRegistry::default(),
            &request,
            &config,
        )
        .unwrap();
        assert_eq!(bundle.stride, 1);
        assert_eq!(bundle.cells.len(), 16 * 16);
        assert!(bundle.cells.iter().all(|c| {
            bbox.contains(GeoPoint::new(c.lat, c.lon)) && c.elevation.is_some() && c.water.is_some()
        }));
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["format"], "vtt");
        assert!(json["bbox"].get("minLat").is_some());
    }

    #[test]
    fn political_style_hides_terrain() {
        let (store, config) = world();
        let request = ExportRequest {
            bbox: bbox_around(&config, SampleCoord::new(0, 0), SampleCoord::new(3, 3)),
            style: MapStyle::Political,
            zoom: 14,
            format: ExportFormat::Pdf,
        };
        let bundle = export_player_map(
            &store,
            &PoiRegistry::new(0),
            &RoadRegistry::default(),
            &request,
            &config,
        )
        .unwrap();
        assert!(!bundle.cells.is_empty());
        assert!(bundle.cells.iter().all(|c| c.elevation.is_none() && c.water.is_some()));
    }

    #[test]
    fn reversed_bbox_is_rejected() {
        let (store, config) = world();
        let request = ExportRequest {
            bbox: BoundingBox {
                min_lat: 1.0,
                min_lon: 0.0,
                max_lat: 0.0,
                max_lon: 1.0,
            },
            style: MapStyle::Atlas,
            zoom: 5,
            format: ExportFormat::Png,
        };
        let err = export_player_map(
            &store,
            &PoiRegistry::new(0),
            &RoadRegistry::default(),
            &request,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, MapError::Validation(_)));
    }

    #[test]
    fn polylines_are_split_at_the_frame() {
        let bbox = BoundingBox {
            min_lat: 0.0,
            min_lon: 0.0,
            max_lat: 1.0,
            max_lon: 1.0,
        };
        let p = GeoPoint::new;
        let points = [
            p(0.1, 0.1),
            p(0.2, 0.2),
            p(2.0, 0.2),
            p(0.3, 0.3),
            p(3.0, 0.3),
            p(0.4, 0.4),
            p(0.5, 0.5),
        ];
        let segments = clip_polyline(&points, &bbox);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], vec![p(0.1, 0.1), p(0.2, 0.2)]);
        assert_eq!(segments[1], vec![p(0.4, 0.4), p(0.5, 0.5)]);
    }
}
