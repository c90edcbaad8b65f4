// egui dashboard

pub mod dashboard;
mod panels;
mod view;
mod worker;

use egui::{Color32, Visuals, style::Widgets};

use crate::session::{Compound, DriverInfo};

pub use dashboard::{DashboardApp, Startup};

pub(crate) const PALETTE_BLACK: Color32 = Color32::from_rgb(12, 12, 12);
pub(crate) const PALETTE_BROWN: Color32 = Color32::from_rgb(72, 30, 20);
pub(crate) const PALETTE_MAROON: Color32 = Color32::from_rgb(155, 57, 34);
pub(crate) const PALETTE_ORANGE: Color32 = Color32::from_rgb(242, 97, 63);

pub(crate) fn dashboard_visuals() -> Visuals {
    Visuals {
        dark_mode: true,
        hyperlink_color: PALETTE_MAROON,
        faint_bg_color: PALETTE_BROWN,
        extreme_bg_color: PALETTE_BLACK,
        panel_fill: PALETTE_BLACK,
        window_fill: PALETTE_BLACK,
        button_frame: true,
        widgets: Widgets::dark(),
        striped: true,
        ..Default::default()
    }
}

pub(crate) fn rgb(colour: (u8, u8, u8)) -> Color32 {
    Color32::from_rgb(colour.0, colour.1, colour.2)
}

pub(crate) fn compound_colour(compound: Compound) -> Color32 {
    rgb(compound.rgb())
}

/// Colours for the two compared drivers. Team mates share a team colour, so
/// the second driver gets a lighter shade in that case.
pub(crate) fn pair_colours(a: Option<&DriverInfo>, b: Option<&DriverInfo>) -> (Color32, Color32) {
    let colour_a = a.map(|d| rgb(d.rgb())).unwrap_or(PALETTE_ORANGE);
    let colour_b = b.map(|d| rgb(d.rgb())).unwrap_or(Color32::LIGHT_BLUE);
    if colour_a == colour_b {
        (
            stroke_shade(colour_a, Color32::from_gray(40), 0.25),
            stroke_shade(colour_b, Color32::from_gray(220), 0.35),
        )
    } else {
        (colour_a, colour_b)
    }
}

/// Linear blend from `start` to `end`, `y` in 0..=1
pub(crate) fn stroke_shade(start: Color32, end: Color32, y: f32) -> Color32 {
    let y = y.clamp(0., 1.);
    let channel = |s: u8, e: u8| {
        (s as f32 + y * (e as f32 - s as f32))
            .round()
            .clamp(0., 255.) as u8
    };
    Color32::from_rgb(
        channel(start.r(), end.r()),
        channel(start.g(), end.g()),
        channel(start.b(), end.b()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_shade_bounds() {
        assert_eq!(stroke_shade(Color32::BLACK, Color32::WHITE, 0.), Color32::BLACK);
        assert_eq!(stroke_shade(Color32::BLACK, Color32::WHITE, 1.), Color32::WHITE);
        assert_eq!(stroke_shade(Color32::BLACK, Color32::WHITE, 7.), Color32::WHITE);
        assert_eq!(
            stroke_shade(Color32::from_rgb(0, 100, 200), Color32::from_rgb(100, 200, 0), 0.5),
            Color32::from_rgb(50, 150, 100)
        );
    }

    #[test]
    fn test_team_mates_get_distinct_colours() {
        let driver = DriverInfo {
            team_colour: Some("3671C6".to_string()),
            ..Default::default()
        };
        let (a, b) = pair_colours(Some(&driver), Some(&driver));
        assert_ne!(a, b);
        let (a, b) = pair_colours(None, None);
        assert_eq!((a, b), (PALETTE_ORANGE, Color32::LIGHT_BLUE));
    }
}
