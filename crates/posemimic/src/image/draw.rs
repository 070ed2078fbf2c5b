//! Drawing primitives.
//!
//! Every function returns a guard that performs the drawing when dropped, so callers can chain
//! customizations: `draw::rect(&mut image, rect).color(Color::RED).fill();`.
//!
//! Colors with an alpha value below 255 are blended onto the existing pixels.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{iso_8859_9, MonoFont, MonoTextStyle},
    prelude::*,
    primitives::{self, Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle, RoundedRectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::image::{blend::blend_alpha, AsImageViewMut, Color, ImageViewMut, Rect};

/// Bitmap fonts available for text rendering.
///
/// All of them cover ISO 8859-9, which includes the Turkish letters used by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    /// 6x10 pixels per glyph.
    Small,
    /// 9x15 pixels per glyph.
    Medium,
    /// 9x15 pixels per glyph, bold.
    MediumBold,
    /// 10x20 pixels per glyph.
    Large,
}

impl Font {
    fn mono(self) -> &'static MonoFont<'static> {
        match self {
            Font::Small => &iso_8859_9::FONT_6X10,
            Font::Medium => &iso_8859_9::FONT_9X15,
            Font::MediumBold => &iso_8859_9::FONT_9X15_BOLD,
            Font::Large => &iso_8859_9::FONT_10X20,
        }
    }

    /// Height of a single line of text, in pixels.
    pub fn line_height(self) -> u32 {
        self.mono().character_size.height
    }

    /// Computes the size of the box `text` occupies when drawn in this font.
    ///
    /// Each `\n` starts a new line.
    pub fn text_size(self, text: &str) -> (u32, u32) {
        let font = self.mono();
        let advance = font.character_size.width + font.character_spacing;
        let lines = text.split('\n');
        let (mut width, mut count) = (0, 0);
        for line in lines {
            let chars = line.chars().count() as u32;
            width = width.max((chars * advance).saturating_sub(font.character_spacing));
            count += 1;
        }
        (width, count * font.character_size.height)
    }
}

/// Guard returned by [`rect`]; draws the rectangle when dropped and allows customization.
pub struct DrawRect<'a> {
    image: ImageViewMut<'a>,
    rect: Rect,
    color: Color,
    stroke_width: u32,
    filled: bool,
    corner_radius: u32,
    dash: Option<u32>,
}

impl DrawRect<'_> {
    /// Sets the rectangle's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the rectangle's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }

    /// Fills the rectangle instead of only drawing its outline.
    pub fn fill(&mut self) -> &mut Self {
        self.filled = true;
        self
    }

    /// Rounds the corners of the rectangle.
    pub fn corner_radius(&mut self, radius: u32) -> &mut Self {
        self.corner_radius = radius;
        self
    }

    /// Draws the outline as dashes of `len` pixels, separated by gaps of the same length.
    ///
    /// Ignored for filled and rounded rectangles.
    pub fn dashed(&mut self, len: u32) -> &mut Self {
        self.dash = Some(len.max(1));
        self
    }

    fn draw_dashed(&mut self, dash: u32) {
        let corners = self.rect.corners();
        for i in 0..4 {
            let (start, end) = (corners[i], corners[(i + 1) % 4]);
            let delta = end - start;
            let len = delta.norm();
            if len <= 0.0 {
                continue;
            }
            let dir = delta / len;
            let mut pos = 0.0;
            while pos < len {
                let seg_end = (pos + dash as f32).min(len);
                let a = start + dir * pos;
                let b = start + dir * seg_end;
                draw(
                    &mut self.image,
                    Line::new(
                        Point::new(a.x.round() as i32, a.y.round() as i32),
                        Point::new(b.x.round() as i32, b.y.round() as i32),
                    )
                    .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width)),
                );
                pos += 2.0 * dash as f32;
            }
        }
    }
}

impl Drop for DrawRect<'_> {
    fn drop(&mut self) {
        if let (Some(dash), false, 0) = (self.dash, self.filled, self.corner_radius) {
            self.draw_dashed(dash);
            return;
        }

        let rect = Rectangle::new(
            Point::new(self.rect.x().round() as i32, self.rect.y().round() as i32),
            Size::new(
                self.rect.width().round() as u32,
                self.rect.height().round() as u32,
            ),
        );
        let style = if self.filled {
            PrimitiveStyleBuilder::new().fill_color(self.color).build()
        } else {
            PrimitiveStyle::with_stroke(self.color, self.stroke_width)
        };

        if self.corner_radius > 0 {
            let radius = Size::new(self.corner_radius, self.corner_radius);
            draw(
                &mut self.image,
                RoundedRectangle::with_equal_corners(rect, radius).into_styled(style),
            );
        } else {
            draw(&mut self.image, rect.into_styled(style));
        }
    }
}

/// Guard returned by [`marker`]; draws the marker when dropped and allows customization.
pub struct DrawMarker<'a> {
    image: ImageViewMut<'a>,
    x: i32,
    y: i32,
    color: Color,
    size: u32,
}

impl<'a> DrawMarker<'a> {
    /// Sets the marker's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the width and height of the marker.
    ///
    /// The default size is 5. The size must be *uneven* and *non-zero*.
    pub fn size(&mut self, size: u32) -> &mut Self {
        assert!(size != 0, "marker size must be greater than zero");
        assert!(size % 2 == 1, "marker size must be an uneven number");
        self.size = size;
        self
    }
}

impl Drop for DrawMarker<'_> {
    fn drop(&mut self) {
        let offset = ((self.size - 1) / 2) as i32;
        let (x, y, color) = (self.x, self.y, self.color);
        let pixels = (-offset..=offset)
            .zip(-offset..=offset)
            .chain((-offset..=offset).rev().zip(-offset..=offset))
            .map(|(xoff, yoff)| Pixel(Point::new(x + xoff, y + yoff), color));
        match Target(self.image.reborrow()).draw_iter(pixels) {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`line`][line()]; draws the line when dropped and allows customization.
pub struct DrawLine<'a> {
    image: ImageViewMut<'a>,
    start: Point,
    end: Point,
    color: Color,
    stroke_width: u32,
}

impl<'a> DrawLine<'a> {
    /// Sets the line's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl<'a> Drop for DrawLine<'a> {
    fn drop(&mut self) {
        draw(
            &mut self.image,
            Line::new(self.start, self.end)
                .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width)),
        );
    }
}

/// Guard returned by [`text`]; draws the text when dropped and allows customization.
pub struct DrawText<'a> {
    image: ImageViewMut<'a>,
    x: i32,
    y: i32,
    text: &'a str,
    color: Color,
    font: Font,
    alignment: Alignment,
    baseline: Baseline,
}

impl<'a> DrawText<'a> {
    /// Sets the text color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the font. Defaults to [`Font::Small`].
    pub fn font(&mut self, font: Font) -> &mut Self {
        self.font = font;
        self
    }

    /// Aligns the top of the text with the `y` coordinate.
    pub fn align_top(&mut self) -> &mut Self {
        self.baseline = Baseline::Top;
        self
    }

    /// Aligns the bottom of the text with the `y` coordinate.
    pub fn align_bottom(&mut self) -> &mut Self {
        self.baseline = Baseline::Bottom;
        self
    }

    /// Aligns the left side of the text with the `x` coordinate.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }

    /// Aligns the right side of the text with the `x` coordinate.
    pub fn align_right(&mut self) -> &mut Self {
        self.alignment = Alignment::Right;
        self
    }
}

impl<'a> Drop for DrawText<'a> {
    fn drop(&mut self) {
        let character_style = MonoTextStyle::new(self.font.mono(), self.color);
        let text_style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        draw(
            &mut self.image,
            Text::with_text_style(
                self.text,
                Point::new(self.x, self.y),
                character_style,
                text_style,
            ),
        );
    }
}

/// Guard returned by [`circle`]; draws the circle when dropped and allows customization.
pub struct DrawCircle<'a> {
    image: ImageViewMut<'a>,
    x: i32,
    y: i32,
    diameter: u32,
    stroke_width: u32,
    filled: bool,
    color: Color,
}

impl<'a> DrawCircle<'a> {
    /// Sets the circle's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the circle's stroke width.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }

    pub fn fill(&mut self) -> &mut Self {
        self.filled = true;
        self
    }
}

impl<'a> Drop for DrawCircle<'a> {
    fn drop(&mut self) {
        let top_left = Point {
            x: self.x - (self.diameter / 2) as i32,
            y: self.y - (self.diameter / 2) as i32,
        };
        let style = if self.filled {
            PrimitiveStyleBuilder::new().fill_color(self.color).build()
        } else {
            PrimitiveStyle::with_stroke(self.color, self.stroke_width)
        };
        draw(
            &mut self.image,
            primitives::Circle::new(top_left, self.diameter).into_styled(style),
        );
    }
}

/// Draws a rectangle onto an image.
pub fn rect<I: AsImageViewMut>(image: &mut I, rect: Rect) -> DrawRect<'_> {
    DrawRect {
        image: image.as_view_mut(),
        rect,
        color: Color::RED,
        stroke_width: 1,
        filled: false,
        corner_radius: 0,
        dash: None,
    }
}

/// Draws a marker onto an image.
///
/// This can be used to visualize landmarks or points of interest.
pub fn marker<I: AsImageViewMut>(image: &mut I, x: i32, y: i32) -> DrawMarker<'_> {
    DrawMarker {
        image: image.as_view_mut(),
        x,
        y,
        color: Color::RED,
        size: 5,
    }
}

/// Draws a line onto an image.
pub fn line<I: AsImageViewMut>(
    image: &mut I,
    start_x: i32,
    start_y: i32,
    end_x: i32,
    end_y: i32,
) -> DrawLine<'_> {
    DrawLine {
        image: image.as_view_mut(),
        start: Point::new(start_x, start_y),
        end: Point::new(end_x, end_y),
        color: Color::from_rgb8(0, 0, 255),
        stroke_width: 1,
    }
}

/// Draws a text string onto an image.
///
/// By default, the text is drawn centered horizontally and vertically around `x` and `y`.
pub fn text<'a, I: AsImageViewMut>(
    image: &'a mut I,
    x: i32,
    y: i32,
    text: &'a str,
) -> DrawText<'a> {
    DrawText {
        image: image.as_view_mut(),
        x,
        y,
        text,
        color: Color::RED,
        font: Font::Small,
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
    }
}

/// Draws a circle onto an image.
pub fn circle<I: AsImageViewMut>(image: &mut I, x: i32, y: i32, diameter: u32) -> DrawCircle<'_> {
    DrawCircle {
        image: image.as_view_mut(),
        x,
        y,
        diameter,
        stroke_width: 1,
        filled: false,
        color: Color::GREEN,
    }
}

fn draw<D: Drawable<Color = Color>>(image: &mut ImageViewMut<'_>, drawable: D) {
    match drawable.draw(&mut Target(image.reborrow())) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

struct Target<'a>(ImageViewMut<'a>);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size {
                width: self.0.width(),
                height: self.0.height(),
            },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                let (x, y) = (pos.x as u32, pos.y as u32);
                let color = if color.a() == 255 {
                    color
                } else {
                    blend_alpha(self.0.get(x, y), color)
                };
                self.0.set(x, y, color);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    #[test]
    fn filled_rect_covers_area() {
        let mut image = Image::filled(8, 8, Color::BLACK);
        rect(&mut image, Rect::from_top_left(2.0, 2.0, 3.0, 3.0))
            .color(Color::WHITE)
            .fill();
        assert_eq!(image.get(2, 2), Color::WHITE);
        assert_eq!(image.get(4, 4), Color::WHITE);
        assert_eq!(image.get(5, 5), Color::BLACK);
        assert_eq!(image.get(1, 2), Color::BLACK);
    }

    #[test]
    fn translucent_fill_blends() {
        let mut image = Image::filled(4, 4, Color::WHITE);
        let area = image.rect();
        rect(&mut image, area)
            .color(Color::BLACK.with_alpha(153))
            .fill();
        let pix = image.get(1, 1);
        assert!(pix.r() > 0 && pix.r() < 255);
        assert_eq!(pix.a(), 255);
    }

    #[test]
    fn out_of_bounds_is_clipped() {
        let mut image = Image::filled(4, 4, Color::BLACK);
        line(&mut image, -10, 1, 10, 1).color(Color::WHITE);
        marker(&mut image, 100, 100);
        assert_eq!(image.get(0, 1), Color::WHITE);
        assert_eq!(image.get(3, 1), Color::WHITE);
        assert_eq!(image.get(0, 0), Color::BLACK);
    }

    #[test]
    fn dashed_outline_has_gaps() {
        let mut image = Image::filled(20, 5, Color::BLACK);
        rect(&mut image, Rect::from_top_left(0.0, 0.0, 19.0, 4.0))
            .color(Color::WHITE)
            .dashed(3);
        assert_eq!(image.get(0, 0), Color::WHITE);
        assert_eq!(image.get(4, 0), Color::BLACK);
        assert_eq!(image.get(6, 0), Color::WHITE);
    }

    #[test]
    fn text_size_counts_lines() {
        assert_eq!(Font::Small.text_size("abc"), (6 * 3, 10));
        assert_eq!(Font::Large.text_size("ab\n\nabcd"), (40, 60));
        assert_eq!(Font::Medium.text_size("Ağız"), (36, 15));
    }

    #[test]
    fn text_draws_pixels() {
        let mut image = Image::filled(60, 20, Color::BLACK);
        text(&mut image, 0, 0, "Poz: ÇĞ").align_left().align_top().color(Color::GREEN);
        let drawn = (0..60)
            .flat_map(|x| (0..20).map(move |y| (x, y)))
            .filter(|&(x, y)| image.get(x, y) == Color::GREEN)
            .count();
        assert!(drawn > 0);
    }
}
