use super::{Color, ImageView, ImageViewMut};

/// Describes how to blend pixels together in a [`Blend`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// All destination pixels will be overwritten with the corresponding source pixel.
    Overwrite,

    /// Performs alpha blending between source and destination pixels to make the source image
    /// appear in front of the destination image.
    Alpha,
}

/// A blending operation between two images.
///
/// Returned by [`Image::blend_from`][super::Image::blend_from] or [`ImageViewMut::blend_from`].
/// The source is scaled to the destination size (nearest neighbor) when the guard is dropped.
pub struct Blend<'a> {
    dest: ImageViewMut<'a>,
    src: ImageView<'a>,
    mode: BlendMode,
}

impl<'a> Blend<'a> {
    pub(super) fn new(dest: ImageViewMut<'a>, src: ImageView<'a>) -> Self {
        Self {
            dest,
            src,
            mode: BlendMode::Alpha,
        }
    }

    /// Sets the blend mode to use.
    pub fn mode(&mut self, mode: BlendMode) -> &mut Self {
        self.mode = mode;
        self
    }
}

impl Drop for Blend<'_> {
    fn drop(&mut self) {
        let (dw, dh) = (self.dest.width(), self.dest.height());
        let (sw, sh) = (self.src.width(), self.src.height());
        if sw == 0 || sh == 0 {
            return;
        }

        for dest_y in 0..dh {
            let src_y = ((dest_y as f32 + 0.5) / dh as f32 * sh as f32) as u32;
            for dest_x in 0..dw {
                let src_x = ((dest_x as f32 + 0.5) / dw as f32 * sw as f32) as u32;

                let src_pix = self.src.get(src_x.min(sw - 1), src_y.min(sh - 1));
                let result = match self.mode {
                    BlendMode::Overwrite => src_pix,
                    BlendMode::Alpha => blend_alpha(self.dest.get(dest_x, dest_y), src_pix),
                };
                self.dest.set(dest_x, dest_y, result);
            }
        }
    }
}

/// Composites `src` over `dest`, in linear color space.
pub(crate) fn blend_alpha(dest: Color, src: Color) -> Color {
    match src.a() {
        255 => return src,
        0 => return dest,
        _ => {}
    }

    fn blend_color(dest: f32, src: f32, dest_alpha: f32, src_alpha: f32, result_alpha: f32) -> f32 {
        (src * src_alpha + dest * dest_alpha * (1.0 - src_alpha)) / result_alpha
    }

    let dest = LinearColor::new(dest);
    let src = LinearColor::new(src);

    let result_alpha = src.a() + dest.a() * (1.0 - src.a());
    if result_alpha <= 0.0 {
        return Color::NULL;
    }
    let r = blend_color(dest.r(), src.r(), dest.a(), src.a(), result_alpha);
    let g = blend_color(dest.g(), src.g(), dest.a(), src.a(), result_alpha);
    let b = blend_color(dest.b(), src.b(), dest.a(), src.a(), result_alpha);

    LinearColor([r, g, b, result_alpha]).to_color()
}

struct LinearColor([f32; 4]);

impl LinearColor {
    fn new(color: Color) -> Self {
        fn to_linear(srgb: f32) -> f32 {
            if srgb <= 0.04045 {
                srgb / 12.92
            } else {
                ((srgb + 0.055) / 1.055).powf(2.4)
            }
        }

        let [r, g, b, a] = color.0.map(|c| f32::from(c) / 255.0);
        Self([to_linear(r), to_linear(g), to_linear(b), a])
    }

    fn to_color(&self) -> Color {
        fn to_srgb(rgb: f32) -> f32 {
            if rgb <= 0.0031308 {
                rgb * 12.92
            } else {
                1.055 * rgb.powf(1.0 / 2.4) - 0.055
            }
        }

        let [r, g, b, a] = self.0;
        let [r, g, b] = [to_srgb(r), to_srgb(g), to_srgb(b)];
        Color([r, g, b, a].map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8))
    }

    fn r(&self) -> f32 {
        self.0[0]
    }

    fn g(&self) -> f32 {
        self.0[1]
    }

    fn b(&self) -> f32 {
        self.0[2]
    }

    fn a(&self) -> f32 {
        self.0[3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Image, Rect};

    #[test]
    fn opaque_and_transparent_sources() {
        assert_eq!(blend_alpha(Color::BLACK, Color::WHITE), Color::WHITE);
        assert_eq!(blend_alpha(Color::BLACK, Color::NULL), Color::BLACK);
    }

    #[test]
    fn translucent_black_darkens() {
        let out = blend_alpha(Color::WHITE, Color::BLACK.with_alpha(153));
        assert_eq!(out.a(), 255);
        assert!(out.r() < 255 && out.r() > 0);
        assert_eq!(out.r(), out.g());
        assert_eq!(out.g(), out.b());
    }

    #[test]
    fn blend_scales_source() {
        let mut src = Image::filled(2, 1, Color::RED);
        src.set(1, 0, Color::GREEN);

        let mut dest = Image::filled(4, 4, Color::BLACK);
        dest.view_mut(Rect::from_top_left(0.0, 0.0, 4.0, 2.0))
            .blend_from(&src)
            .mode(BlendMode::Overwrite);

        assert_eq!(dest.get(0, 0), Color::RED);
        assert_eq!(dest.get(1, 1), Color::RED);
        assert_eq!(dest.get(3, 1), Color::GREEN);
        assert_eq!(dest.get(3, 2), Color::BLACK);
    }
}
