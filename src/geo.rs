// src/geo.rs
use crate::grid::SampleCoord;
use serde::{Deserialize, Serialize};

/// Километров в одном градусе широты
pub const KM_PER_DEGREE: f64 = 111.32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Равнопромежуточная проекция вокруг точки начала координат мира.
///
/// Мир ограничен несколькими кольцами тайлов, поэтому искажение на таком масштабе пренебрежимо.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    origin: GeoPoint,
    km_per_sample: f64,
    lon_scale: f64,
}

impl Projection {
    #[must_use]
    pub fn new(origin: GeoPoint, km_per_sample: f32) -> Self {
        let lon_scale = origin.lat.to_radians().cos().abs().max(1e-6);
        Self {
            origin,
            km_per_sample: f64::from(km_per_sample),
            lon_scale,
        }
    }

    #[must_use]
    pub fn km_per_sample(&self) -> f32 {
        self.km_per_sample as f32
    }

    #[must_use]
    pub fn to_geo(&self, sample: SampleCoord) -> GeoPoint {
        let north_km = f64::from(sample.y) * self.km_per_sample;
        let east_km = f64::from(sample.x) * self.km_per_sample;
        GeoPoint {
            lat: self.origin.lat + north_km / KM_PER_DEGREE,
            lon: self.origin.lon + east_km / (KM_PER_DEGREE * self.lon_scale),
        }
    }

    /// Ближайший сэмпл к географической точке
    #[must_use]
    pub fn to_sample(&self, point: GeoPoint) -> SampleCoord {
        let north_km = (point.lat - self.origin.lat) * KM_PER_DEGREE;
        let east_km = (point.lon - self.origin.lon) * KM_PER_DEGREE * self.lon_scale;
        SampleCoord::new(
            (east_km / self.km_per_sample).round() as i32,
            (north_km / self.km_per_sample).round() as i32,
        )
    }

    /// Расстояние между сэмплами в километрах по плоскости проекции
    #[must_use]
    pub fn distance_km(&self, a: SampleCoord, b: SampleCoord) -> f32 {
        a.distance(b) * self.km_per_sample()
    }

    /// Сколько сэмплов укладывается в `km` (с округлением вверх)
    #[must_use]
    pub fn samples_for_km(&self, km: f32) -> i32 {
        (f64::from(km) / self.km_per_sample).ceil() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_and_sample_agree_near_origin() {
        let projection = Projection::new(GeoPoint::new(41.0, -12.0), 0.5);
        let sample = SampleCoord::new(37, -12);
        let back = projection.to_sample(projection.to_geo(sample));
        assert_eq!(back, sample);
    }

    #[test]
    fn distance_uses_sample_spacing() {
        let projection = Projection::new(GeoPoint::default(), 0.5);
        let d = projection.distance_km(SampleCoord::new(0, 0), SampleCoord::new(3, 4));
        assert!((d - 2.5).abs() < 1e-6);
        assert_eq!(projection.samples_for_km(2.1), 5);
    }
}
