// src/api.rs
//! Записи запросов и ответов в JSON-формате внешнего API
//!
//! Имена полей и значения по умолчанию совпадают со схемами сервиса
//! (`updatedTiles`, `atIndex`, `minLat`, `within_km` и т. д.). Каждая запись
//! запроса проверяется до того, как операция коснётся мира.

use crate::biome::Biome;
use crate::brush::{Brush, BrushCenter, BrushMode, BrushShape};
use crate::error::{ErrorKind, MapError, Result};
use crate::geo::GeoPoint;
use crate::grid::{Direction, TileId};
use crate::hydrology::HydrologyReport;
use crate::poi::{
    Poi, PoiKind, QuestKind, QuestQuery, QuestSuggestion, SettlementKind, SettlementOptions,
};
use crate::roads::{Bridge, Road, RoadProfile, RouteEndpoint};
use crate::style::{BoundingBox, ExportBundle, ExportFormat, ExportRequest, MapStyle};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldExpandRequest {
    pub seed: String,
    pub ring: u32,
    #[serde(default)]
    pub direction: Direction,
}

impl WorldExpandRequest {
    pub fn validate(&self) -> Result<()> {
        if self.seed.is_empty() {
            return Err(MapError::InvalidSeed(self.seed.clone()));
        }
        if self.ring < 1 {
            return Err(MapError::Validation("ring must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldExpandResponse {
    pub ok: bool,
    pub seed: String,
    pub ring: u32,
    pub direction: Direction,
    pub created: Vec<TileId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushParams {
    #[serde(rename = "type")]
    pub shape: BrushShape,
    pub strength: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditHeightRequest {
    pub tile: TileId,
    pub brush: BrushParams,
    pub center: BrushCenter,
    pub mode: BrushMode,
}

impl EditHeightRequest {
    #[must_use]
    pub fn to_brush(&self) -> Brush {
        Brush {
            shape: self.brush.shape,
            strength: self.brush.strength,
            radius: self.brush.radius,
            center: self.center,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.to_brush().validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditHeightResponse {
    pub ok: bool,
    pub applied: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydroRecomputeRequest {
    pub tile: TileId,
    #[serde(default = "default_true")]
    pub downstream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydroRecomputeResponse {
    pub ok: bool,
    pub updated_tiles: Vec<TileId>,
    pub downstream: bool,
    pub warnings: Vec<String>,
}

impl HydroRecomputeResponse {
    #[must_use]
    pub fn new(report: HydrologyReport, downstream: bool) -> Self {
        Self {
            ok: true,
            updated_tiles: report.updated_tiles,
            downstream,
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiSettlementRequest {
    #[serde(default)]
    pub subtype: SettlementKind,
    pub loc: GeoPoint,
    #[serde(default)]
    pub options: SettlementOptions,
}

impl PoiSettlementRequest {
    pub fn validate(&self) -> Result<()> {
        if !(self.loc.lat.is_finite() && self.loc.lon.is_finite()) {
            return Err(MapError::Validation("loc must be finite".into()));
        }
        if !(-90.0..=90.0).contains(&self.loc.lat) || !(-180.0..=180.0).contains(&self.loc.lon) {
            return Err(MapError::Validation(format!(
                "loc ({}, {}) is not a valid lat/lon",
                self.loc.lat, self.loc.lon
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoiSettlementResponse {
    pub ok: bool,
    pub poi_id: String,
    pub subtype: SettlementKind,
    /// Итоговое положение (после привязки)
    pub loc: GeoPoint,
    pub options: SettlementOptions,
    pub score: f32,
}

impl PoiSettlementResponse {
    #[must_use]
    pub fn new(poi: Poi, options: SettlementOptions) -> Self {
        let PoiKind::Settlement { subtype, score, .. } = poi.kind;
        Self {
            ok: true,
            poi_id: poi.id,
            subtype,
            loc: poi.loc,
            options,
            score,
        }
    }
}

fn default_within_km() -> f32 {
    30.0
}

fn default_avoid_settlements_km() -> f32 {
    3.0
}

fn default_suggestion_count() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiQuestSuggestRequest {
    #[serde(rename = "type", default)]
    pub kind: QuestKind,
    pub near: TileId,
    #[serde(default = "default_within_km")]
    pub within_km: f32,
    #[serde(default = "default_avoid_settlements_km")]
    pub avoid_settlements_km: f32,
    #[serde(default)]
    pub biome: Option<Vec<Biome>>,
    #[serde(default = "default_suggestion_count")]
    pub n: usize,
}

impl PoiQuestSuggestRequest {
    #[must_use]
    pub fn to_query(&self) -> QuestQuery {
        QuestQuery {
            kind: self.kind,
            near: self.near,
            within_km: self.within_km,
            avoid_settlements_km: self.avoid_settlements_km,
            biomes: self.biome.clone(),
            n: self.n,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.to_query().validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionRecord {
    pub id: String,
    pub score: f32,
    pub loc: GeoPoint,
    pub reason: Vec<String>,
}

impl From<QuestSuggestion> for SuggestionRecord {
    fn from(s: QuestSuggestion) -> Self {
        Self {
            id: s.id,
            score: s.score,
            loc: s.loc,
            reason: s.reasons,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoiQuestSuggestResponse {
    pub ok: bool,
    pub suggestions: Vec<SuggestionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadsAutorouteRequest {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub profile: RoadProfile,
}

impl RoadsAutorouteRequest {
    pub fn endpoints(&self) -> Result<(RouteEndpoint, RouteEndpoint)> {
        Ok((self.from.parse()?, self.to.parse()?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadsAutorouteResponse {
    pub ok: bool,
    pub id: String,
    pub polyline: Vec<GeoPoint>,
    pub bridges: Vec<Bridge>,
    pub cost_km: f32,
}

impl From<Road> for RoadsAutorouteResponse {
    fn from(road: Road) -> Self {
        Self {
            ok: true,
            id: road.id,
            polyline: road.polyline,
            bridges: road.bridges,
            cost_km: road.cost_km,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StyleSwitchRequest {
    #[serde(default)]
    pub style: MapStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StyleSwitchResponse {
    pub ok: bool,
    pub style: MapStyle,
}

fn default_export_style() -> MapStyle {
    MapStyle::Atlas
}

fn default_zoom() -> u8 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportPlayerMapRequest {
    pub bbox: BoundingBox,
    #[serde(default = "default_export_style")]
    pub style: MapStyle,
    #[serde(default = "default_zoom")]
    pub zoom: u8,
    #[serde(default)]
    pub format: ExportFormat,
}

impl ExportPlayerMapRequest {
    #[must_use]
    pub fn to_request(&self) -> ExportRequest {
        ExportRequest {
            bbox: self.bbox,
            style: self.style,
            zoom: self.zoom,
            format: self.format,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.to_request().validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportPlayerMapResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub bundle: ExportBundle,
}

/// Тело ответа с ошибкой
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    pub kind: ErrorKind,
}

impl ApiError {
    /// HTTP-статус, которым транспорт отвечает на ошибку этой категории
    #[must_use]
    pub fn status(&self) -> u16 {
        match self.kind {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Unreachable => 422,
        }
    }
}

impl From<&MapError> for ApiError {
    fn from(err: &MapError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expand_defaults_to_east() {
        let req: WorldExpandRequest =
            serde_json::from_value(json!({ "seed": "abc", "ring": 1 })).unwrap();
        assert_eq!(req.direction, Direction::E);
        assert!(req.validate().is_ok());
        let bad: WorldExpandRequest =
            serde_json::from_value(json!({ "seed": "", "ring": 1 })).unwrap();
        assert!(matches!(bad.validate(), Err(MapError::InvalidSeed(_))));
        assert!(serde_json::from_value::<WorldExpandRequest>(json!({ "seed": "a", "ring": -1 })).is_err());
    }

    #[test]
    fn edit_height_uses_schema_names() {
        let req: EditHeightRequest = serde_json::from_value(json!({
            "tile": "0:0",
            "brush": { "type": "gauss", "strength": 5.0, "radius": 2.0 },
            "center": { "x": 3, "y": 4 },
            "mode": "raise"
        }))
        .unwrap();
        assert_eq!(req.tile, TileId::ORIGIN);
        assert_eq!(req.to_brush().shape, BrushShape::Gaussian);
        assert_eq!(req.to_brush().center.y, 4.0);
        assert!(req.validate().is_ok());

        let zero_radius = EditHeightRequest {
            brush: BrushParams {
                radius: 0.0,
                ..req.brush
            },
            ..req
        };
        assert!(matches!(zero_radius.validate(), Err(MapError::InvalidBrush(_))));
    }

    #[test]
    fn quest_request_defaults() {
        let req: PoiQuestSuggestRequest =
            serde_json::from_value(json!({ "near": "1:-1" })).unwrap();
        assert_eq!(req.kind, QuestKind::Ruin);
        assert_eq!(req.within_km, 30.0);
        assert_eq!(req.avoid_settlements_km, 3.0);
        assert_eq!(req.n, 5);
        assert_eq!(req.biome, None);
        assert!(req.validate().is_ok());

        let req: PoiQuestSuggestRequest = serde_json::from_value(
            json!({ "type": "lair", "near": "0:0", "biome": ["swamp"], "n": 30 }),
        )
        .unwrap();
        assert_eq!(req.biome, Some(vec![Biome::Swamp]));
        assert!(req.validate().is_err());
    }

    #[test]
    fn settlement_request_defaults() {
        let req: PoiSettlementRequest =
            serde_json::from_value(json!({ "loc": { "lat": 0.01, "lon": 0.02 } })).unwrap();
        assert_eq!(req.subtype, SettlementKind::Town);
        assert!(req.options.snap);
        assert!(!req.options.walls);
        let req: PoiSettlementRequest = serde_json::from_value(
            json!({ "subtype": "city", "loc": { "lat": 0.0, "lon": 0.0 }, "options": { "walls": true } }),
        )
        .unwrap();
        assert!(req.options.snap && req.options.walls);
        let far: PoiSettlementRequest =
            serde_json::from_value(json!({ "loc": { "lat": 95.0, "lon": 0.0 } })).unwrap();
        assert!(far.validate().is_err());
    }

    #[test]
    fn export_defaults_and_field_names() {
        let req: ExportPlayerMapRequest = serde_json::from_value(json!({
            "bbox": { "minLat": 0.0, "minLon": 0.0, "maxLat": 0.1, "maxLon": 0.1 }
        }))
        .unwrap();
        assert_eq!(req.style, MapStyle::Atlas);
        assert_eq!(req.zoom, 5);
        assert_eq!(req.format, ExportFormat::Png);
        assert!(req.validate().is_ok());

        let style: StyleSwitchRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(style.style, MapStyle::Realistic);
    }

    #[test]
    fn responses_use_schema_field_names() {
        let resp = HydroRecomputeResponse::new(
            HydrologyReport {
                updated_tiles: vec![TileId::ORIGIN],
                warnings: Vec::new(),
            },
            true,
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["updatedTiles"], json!(["0:0"]));

        let route: RoadsAutorouteRequest =
            serde_json::from_value(json!({ "from": "0:0", "to": "settlement:abc123" })).unwrap();
        assert_eq!(route.profile, RoadProfile::Medieval);
        let (from, to) = route.endpoints().unwrap();
        assert_eq!(from, RouteEndpoint::Tile(TileId::ORIGIN));
        assert_eq!(to, RouteEndpoint::Poi("settlement:abc123".into()));
    }

    #[test]
    fn errors_map_to_status_codes() {
        let err = ApiError::from(&MapError::NoPath {
            from: "0:0".into(),
            to: "1:0".into(),
        });
        assert_eq!(err.status(), 422);
        let err = ApiError::from(&MapError::TileNotFound(TileId::new(2, 2)));
        assert_eq!(err.status(), 404);
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "error": "tile 2:2 has not been generated", "kind": "not_found" })
        );
    }
}
