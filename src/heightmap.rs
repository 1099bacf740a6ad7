use image::{ImageBuffer, Luma};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Двумерная сетка высот в метрах, построчно (`y * width + x`)
#[derive(Debug, Clone, PartialEq)]
pub struct Heightmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Heightmap {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width * height) as usize],
        }
    }

    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width * height) as usize],
        }
    }

    #[must_use]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    /// Переводит высоты в оттенки серого, растягивая `[lo, hi]` на `0..=255`.
    ///
    /// Строка 0 изображения соответствует северному краю (максимальный `y`).
    #[must_use]
    pub fn to_grayscale_image(&self, lo: f32, hi: f32) -> Vec<u8> {
        let span = (hi - lo).max(f32::EPSILON);
        let width = self.width as usize;
        let height = self.height as usize;
        let pixel = |i: usize| {
            let x = i % width;
            let y = height - 1 - i / width;
            let v = self.data[y * width + x];
            (((v - lo) / span).clamp(0.0, 1.0) * 255.0) as u8
        };

        #[cfg(feature = "parallel")]
        let pixels = (0..self.data.len()).into_par_iter().map(pixel).collect();
        #[cfg(not(feature = "parallel"))]
        let pixels = (0..self.data.len()).map(pixel).collect();

        pixels
    }

    pub fn save_as_png(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let (lo, hi) = self.min_max();
        let img: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_raw(self.width, self.height, self.to_grayscale_image(lo, hi))
                .ok_or("Failed to create image buffer")?;
        img.save(path)?;
        Ok(())
    }
}
