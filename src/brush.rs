// src/brush.rs
//! Кисть для редактирования высот
//!
//! Кисть задаётся в локальных координатах тайла, но её диск может выходить за его
//! пределы: правка распространяется на все сгенерированные тайлы, которых касается диск.
//! Все новые значения сначала вычисляются по исходной поверхности, затем
//! записываются одним коммитом.

use crate::config::BrushSettings;
use crate::error::{MapError, Result};
use crate::grid::{SampleCoord, TileId};
use crate::store::HeightFieldStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushShape {
    #[serde(rename = "gauss", alias = "gaussian")]
    Gaussian,
    Linear,
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushMode {
    Raise,
    Lower,
    Smooth,
    Terrace,
}

/// Центр кисти в локальных координатах тайла (в сэмплах, может быть дробным)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BrushCenter {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub shape: BrushShape,
    pub strength: f32,
    /// Радиус в сэмплах
    pub radius: f32,
    pub center: BrushCenter,
}

impl Brush {
    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(MapError::InvalidBrush(format!(
                "radius must be a positive number, got {}",
                self.radius
            )));
        }
        if !self.strength.is_finite() {
            return Err(MapError::InvalidBrush("strength must be finite".into()));
        }
        if !(self.center.x.is_finite() && self.center.y.is_finite()) {
            return Err(MapError::InvalidBrush("center must be finite".into()));
        }
        Ok(())
    }

    /// Вес кисти на расстоянии `d` от центра; вне радиуса 0
    #[must_use]
    pub fn weight(&self, d: f32, gaussian_k: f32) -> f32 {
        if d > self.radius {
            return 0.0;
        }
        let t = d / self.radius;
        match self.shape {
            BrushShape::Gaussian => (-(t * t) * gaussian_k).exp(),
            BrushShape::Linear => (1.0 - t).max(0.0),
            BrushShape::Smooth => 1.0 - smoothstep(0.0, self.radius, d),
        }
    }
}

#[must_use]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Среднее 3×3 окрестности по исходной поверхности (только существующие сэмплы)
fn neighborhood_mean(store: &HeightFieldStore, sample: SampleCoord) -> Option<f32> {
    let mut sum = 0.0;
    let mut count = 0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if let Some(h) = store.elevation_at(SampleCoord::new(sample.x + dx, sample.y + dy)) {
                sum += h;
                count += 1;
            }
        }
    }
    (count > 0).then(|| sum / count as f32)
}

/// Применяет кисть и возвращает число сэмплов, значение которых изменилось
pub fn apply_brush(
    store: &mut HeightFieldStore,
    tile: TileId,
    brush: &Brush,
    mode: BrushMode,
    settings: &BrushSettings,
) -> Result<usize> {
    brush.validate()?;
    store.tile(tile)?;

    let grid = store.grid().clone();
    let origin = grid.tile_origin(tile);
    let cx = origin.x as f32 + brush.center.x;
    let cy = origin.y as f32 + brush.center.y;
    let r = brush.radius;

    // Диск обрезается границами мира, иначе огромный радиус перебирал бы пустоту
    let (world_min, world_max) = grid.sample_bounds();
    let min = SampleCoord::new(
        ((cx - r).floor() as i32).max(world_min.x),
        ((cy - r).floor() as i32).max(world_min.y),
    );
    let max = SampleCoord::new(
        ((cx + r).ceil() as i32).min(world_max.x),
        ((cy + r).ceil() as i32).min(world_max.y),
    );
    if min.x > max.x || min.y > max.y {
        return Ok(0);
    }

    let terrace_step = (brush.strength.abs() * settings.terrace_step_scale)
        .max(settings.min_terrace_step);

    let mut writes = Vec::new();
    for gy in min.y..=max.y {
        for gx in min.x..=max.x {
            let d = (gx as f32 - cx).hypot(gy as f32 - cy);
            if d > r {
                continue;
            }
            let sample = SampleCoord::new(gx, gy);
            // несгенерированные тайлы внутри диска пропускаются
            let Some(current) = store.elevation_at(sample) else {
                continue;
            };
            let w = brush.weight(d, settings.gaussian_k);
            let target = match mode {
                BrushMode::Raise => current + brush.strength * w,
                BrushMode::Lower => current - brush.strength * w,
                BrushMode::Smooth => {
                    let mean = neighborhood_mean(store, sample).unwrap_or(current);
                    current + (mean - current) * brush.strength.clamp(0.0, 1.0) * w
                }
                BrushMode::Terrace => {
                    let level = (current / terrace_step).round() * terrace_step;
                    current + (level - current) * w
                }
            };
            let value = store.clamp(target);
            if value != current {
                writes.push((sample, value));
            }
        }
    }

    if writes.is_empty() {
        tracing::debug!(tile = %tile, ?mode, "brush changed nothing");
        return Ok(0);
    }

    // Тайлы, касающиеся диска, и их соседи по краевым сэмплам
    let dirty: BTreeSet<TileId> = grid
        .tiles_in_box(
            SampleCoord::new(min.x - 1, min.y - 1),
            SampleCoord::new(max.x + 1, max.y + 1),
        )
        .filter(|&id| store.contains(id))
        .collect();
    store.commit(&writes, &dirty)?;

    tracing::debug!(
        tile = %tile,
        ?mode,
        shape = ?brush.shape,
        modified = writes.len(),
        dirty_tiles = dirty.len(),
        "brush applied"
    );
    Ok(writes.len())
}
