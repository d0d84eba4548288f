use std::fmt::Debug;

/// A decoded RGB frame. Channel values are floats in `[0, 1]`, stored
/// row-major as `[r, g, b, r, g, b, ..]`.
#[derive(Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Frame {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            width * height * 3,
            "frame buffer does not match {width}x{height}"
        );
        Self {
            width,
            height,
            data,
        }
    }

    /// An all-black frame, used to pad short batches.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height * 3],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> [f32; 3] {
        let base = (y * self.width + x) * 3;
        [self.data[base], self.data[base + 1], self.data[base + 2]]
    }

    /// Shrinks the frame with an area average until `width * height` fits
    /// `max_pixels`. Frames already within the budget pass through untouched.
    /// Aspect ratio is preserved up to integer rounding.
    pub fn fit_to_pixels(self, max_pixels: usize) -> Frame {
        let (width, height) = fit_dimensions(self.width, self.height, max_pixels);
        if (width, height) == (self.width, self.height) {
            return self;
        }
        self.resize_area(width, height)
    }

    fn resize_area(&self, new_width: usize, new_height: usize) -> Frame {
        let mut data = Vec::with_capacity(new_width * new_height * 3);
        for dy in 0..new_height {
            let y0 = dy * self.height / new_height;
            let y1 = ((dy + 1) * self.height / new_height).max(y0 + 1);
            for dx in 0..new_width {
                let x0 = dx * self.width / new_width;
                let x1 = ((dx + 1) * self.width / new_width).max(x0 + 1);
                let mut acc = [0.0f64; 3];
                for y in y0..y1 {
                    for x in x0..x1 {
                        let base = (y * self.width + x) * 3;
                        acc[0] += self.data[base] as f64;
                        acc[1] += self.data[base + 1] as f64;
                        acc[2] += self.data[base + 2] as f64;
                    }
                }
                let count = ((x1 - x0) * (y1 - y0)) as f64;
                data.push((acc[0] / count) as f32);
                data.push((acc[1] / count) as f32);
                data.push((acc[2] / count) as f32);
            }
        }
        Frame::new(new_width, new_height, data)
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Dimensions [`Frame::fit_to_pixels`] would shrink a `width` by `height`
/// frame to, unchanged when the frame already fits.
pub fn fit_dimensions(width: usize, height: usize, max_pixels: usize) -> (usize, usize) {
    let area = width * height;
    if area <= max_pixels {
        return (width, height);
    }
    let scale = (max_pixels as f64 / area as f64).sqrt();
    (
        ((width as f64 * scale) as usize).max(1),
        ((height as f64 * scale) as usize).max(1),
    )
}
