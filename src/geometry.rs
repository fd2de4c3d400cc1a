//! Pure geometry policy: snap/maximize/fullscreen target rectangles and
//! initial window placement. Everything in here is integer arithmetic over
//! the screen size and the configured border/gap/reserved bands; no state.

use crate::{
    config::Config,
    xconnection::{Point, Rectangle},
};

/// The eight snap targets reachable by keybind or by dragging into a screen
/// edge. `Max` occupies the whole available area; the others are halves and
/// quadrants.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SnapZone {
    Left,
    LeftUp,
    LeftDown,
    Right,
    RightUp,
    RightDown,
    Max,
}

// Width/height must never go negative when the screen is smaller than the
// configured gaps and borders; saturate at one pixel.
fn dim(v: i64) -> u32 {
    v.max(1) as u32
}

/// Target rectangle for a snap zone.
pub fn snap_rect(zone: SnapZone, config: &Config, screen: (u32, u32)) -> Rectangle {
    let (sw, sh) = (screen.0 as i64, screen.1 as i64);
    let g = config.gap_px as i64;
    let b = config.border_px as i64;
    let top = config.top_reserved_px as i64;
    let bot = config.bottom_reserved_px as i64;

    // 1.5 * gap between a half-snapped window and the screen center line
    let half_w = sw / 2 - 3 * g / 2 - 2 * b;
    let full_h = sh - 2 * g - 2 * b - top - bot;
    let quarter_h = (sh - top - bot) / 2 - 3 * g / 2 - 2 * b;

    let left_x = g;
    let right_x = sw / 2 + g / 2;
    let up_y = g + top;
    let down_y = (sh - top - bot) / 2 + g / 2 + top;

    match zone {
        SnapZone::Left => rect(left_x, up_y, half_w, full_h),
        SnapZone::LeftUp => rect(left_x, up_y, half_w, quarter_h),
        SnapZone::LeftDown => rect(left_x, down_y, half_w, quarter_h),
        SnapZone::Right => rect(right_x, up_y, half_w, full_h),
        SnapZone::RightUp => rect(right_x, up_y, half_w, quarter_h),
        SnapZone::RightDown => rect(right_x, down_y, half_w, quarter_h),
        SnapZone::Max => {
            if config.smart_snap_max {
                rect(0, top, sw - 2 * b, sh - 2 * b - top - bot)
            } else {
                rect(g, g + top, sw - 2 * g - 2 * b, sh - 2 * g - 2 * b - top - bot)
            }
        }
    }
}

/// Fullscreen covers the whole screen including the reserved bands; the
/// negative origin compensates for the border the server adds back.
pub fn fullscreen_rect(config: &Config, screen: (u32, u32)) -> Rectangle {
    let b = config.border_px as i32;
    Rectangle::new(-b, -b, screen.0, screen.1)
}

fn rect(x: i64, y: i64, w: i64, h: i64) -> Rectangle {
    Rectangle::new(x as i32, y as i32, dim(w), dim(h))
}

/// Classify a pointer position into the snap zone it selects during a move
/// drag, or `None` when the pointer is outside every edge margin. Within a
/// margin, proximity to the perpendicular screen corners turns an edge snap
/// into the matching quadrant snap; the top edge maximizes instead of
/// half-snapping.
pub fn zone_at_pointer(config: &Config, screen: (u32, u32), p: Point) -> Option<SnapZone> {
    let margin = config.snap_margin_px as i32;
    let corner = config.snap_corner_px as i32;
    let (sw, sh) = (screen.0 as i32, screen.1 as i32);

    let sub = |pos: i32, span: i32, near: SnapZone, far: SnapZone, edge: SnapZone| {
        if pos < corner {
            near
        } else if pos > span - corner {
            far
        } else {
            edge
        }
    };

    if p.x < margin {
        Some(sub(p.y, sh, SnapZone::LeftUp, SnapZone::LeftDown, SnapZone::Left))
    } else if p.y < margin {
        Some(sub(p.x, sw, SnapZone::LeftUp, SnapZone::RightUp, SnapZone::Max))
    } else if p.x > sw - margin {
        Some(sub(p.y, sh, SnapZone::RightUp, SnapZone::RightDown, SnapZone::Right))
    } else if p.y > sh - margin {
        Some(sub(p.x, sw, SnapZone::LeftDown, SnapZone::RightDown, SnapZone::Max))
    } else {
        None
    }
}

/// Place a newly mapped window centered under the pointer, clamped so the
/// window body (including borders) stays inside the screen, with the
/// reserved top/bottom bands excluded vertically. The requested size is
/// clamped to the available area first.
pub fn initial_placement(
    config: &Config,
    screen: (u32, u32),
    pointer: Point,
    size: (u32, u32),
) -> Rectangle {
    let (sw, sh) = (screen.0 as i64, screen.1 as i64);
    let b = config.border_px as i64;
    let top = config.top_reserved_px as i64;
    let bot = config.bottom_reserved_px as i64;

    let w = (size.0 as i64).min((sw - 2 * b).max(1));
    let h = (size.1 as i64).min((sh - top - bot - 2 * b).max(1));

    let x = place(pointer.x as i64, w, 0, sw, b);
    let y = place(pointer.y as i64, h, top, sh - bot, b);

    rect(x, y, w, h)
}

// Center `sze` on `ptr` within the band [lo, hi), keeping the border inside.
fn place(ptr: i64, sze: i64, lo: i64, hi: i64, b: i64) -> i64 {
    if ptr < lo + sze / 2 + b {
        lo
    } else if ptr + sze / 2 + b > hi {
        hi - sze - 2 * b
    } else {
        ptr - sze / 2 - b
    }
}

/// Offset of a window's visual center from its origin, border included.
/// Used to re-center the pointer after a keyboard snap or a cycle step.
pub fn center_offset(config: &Config, geom: &Rectangle) -> (u32, u32) {
    let b = config.border_px;
    ((geom.width() + 2 * b) / 2, (geom.height() + 2 * b) / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_config() -> Config {
        Config {
            border_px: 6,
            gap_px: 10,
            top_reserved_px: 34,
            bottom_reserved_px: 0,
            snap_margin_px: 5,
            snap_corner_px: 256,
            smart_snap_max: false,
            ..Config::default()
        }
    }

    const SCREEN: (u32, u32) = (1920, 1080);

    #[test]
    fn half_snaps_split_the_screen() {
        let config = test_config();
        // half width minus 1.5 * gap minus 2 * border
        assert_eq!(
            snap_rect(SnapZone::Left, &config, SCREEN),
            Rectangle::new(10, 44, 933, 1014),
        );
        assert_eq!(
            snap_rect(SnapZone::Right, &config, SCREEN),
            Rectangle::new(965, 44, 933, 1014),
        );
    }

    #[test]
    fn quadrant_snaps_split_the_available_height() {
        let config = test_config();
        assert_eq!(
            snap_rect(SnapZone::LeftUp, &config, SCREEN),
            Rectangle::new(10, 44, 933, 496),
        );
        assert_eq!(
            snap_rect(SnapZone::LeftDown, &config, SCREEN),
            Rectangle::new(10, 562, 933, 496),
        );
        assert_eq!(
            snap_rect(SnapZone::RightDown, &config, SCREEN),
            Rectangle::new(965, 562, 933, 496),
        );
    }

    #[test]
    fn max_respects_gaps_unless_smart() {
        let mut config = test_config();
        assert_eq!(
            snap_rect(SnapZone::Max, &config, SCREEN),
            Rectangle::new(10, 44, 1888, 1014),
        );
        config.smart_snap_max = true;
        assert_eq!(
            snap_rect(SnapZone::Max, &config, SCREEN),
            Rectangle::new(0, 34, 1908, 1034),
        );
    }

    #[test]
    fn fullscreen_compensates_for_border() {
        let config = test_config();
        assert_eq!(
            fullscreen_rect(&config, SCREEN),
            Rectangle::new(-6, -6, 1920, 1080),
        );
    }

    #[test]
    fn snap_sizes_never_go_negative_on_tiny_screens() {
        let config = test_config();
        let r = snap_rect(SnapZone::LeftUp, &config, (16, 16));
        assert!(r.width() >= 1 && r.height() >= 1);
        let r = snap_rect(SnapZone::Max, &config, (4, 4));
        assert!(r.width() >= 1 && r.height() >= 1);
    }

    #[test]
    fn edge_margins_classify_zones() {
        let config = test_config();
        let zone = |x, y| zone_at_pointer(&config, SCREEN, Point::new(x, y));

        assert_eq!(zone(2, 540), Some(SnapZone::Left));
        assert_eq!(zone(2, 100), Some(SnapZone::LeftUp));
        assert_eq!(zone(2, 900), Some(SnapZone::LeftDown));
        assert_eq!(zone(1917, 540), Some(SnapZone::Right));
        assert_eq!(zone(1917, 100), Some(SnapZone::RightUp));
        assert_eq!(zone(1917, 1000), Some(SnapZone::RightDown));
        // the top edge maximizes instead of half-snapping
        assert_eq!(zone(960, 2), Some(SnapZone::Max));
        assert_eq!(zone(100, 2), Some(SnapZone::LeftUp));
        assert_eq!(zone(1800, 2), Some(SnapZone::RightUp));
        assert_eq!(zone(960, 1078), Some(SnapZone::Max));
        assert_eq!(zone(100, 1078), Some(SnapZone::LeftDown));
        assert_eq!(zone(960, 540), None);
    }

    #[test]
    fn placement_centers_under_pointer() {
        let config = test_config();
        let r = initial_placement(&config, SCREEN, Point::new(960, 540), (400, 300));
        assert_eq!(r, Rectangle::new(754, 384, 400, 300));
    }

    #[test]
    fn placement_clamps_to_screen_edges() {
        let config = test_config();

        let r = initial_placement(&config, SCREEN, Point::new(3, 540), (400, 300));
        assert_eq!(r.x(), 0);

        let r = initial_placement(&config, SCREEN, Point::new(1918, 540), (400, 300));
        // x + width + 2 * border == screen width
        assert_eq!(r.x() + r.width() as i32 + 12, 1920);

        // the top reserved band is kept clear
        let r = initial_placement(&config, SCREEN, Point::new(960, 10), (400, 300));
        assert_eq!(r.y(), 34);
    }

    #[test]
    fn placement_shrinks_oversized_windows() {
        let config = test_config();
        let r = initial_placement(&config, SCREEN, Point::new(960, 540), (5000, 5000));
        assert_eq!(r.width(), 1920 - 12);
        assert_eq!(r.height(), 1080 - 34 - 12);
    }
}
