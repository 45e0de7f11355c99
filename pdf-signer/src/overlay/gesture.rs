//! Drag and resize gestures as pure overlay state transitions.

use serde::Deserialize;

use super::Overlay;
use super::geometry::{Rect, Size, fit_width};

/// Which handle of the overlay a resize interaction grabbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeHandle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl ResizeHandle {
    /// Whether the overlay grows towards +x / +y while this handle is dragged
    fn growth(self) -> (bool, bool) {
        match self {
            ResizeHandle::TopLeft => (false, false),
            ResizeHandle::Top => (true, false),
            ResizeHandle::TopRight => (true, false),
            ResizeHandle::Right => (true, true),
            ResizeHandle::BottomRight => (true, true),
            ResizeHandle::Bottom => (true, true),
            ResizeHandle::BottomLeft => (false, true),
            ResizeHandle::Left => (false, true),
        }
    }

    /// Width requested by a proposed rectangle, honouring the locked aspect.
    fn requested_width(self, proposed: &Rect, aspect_ratio: f64) -> f64 {
        match self {
            ResizeHandle::Left | ResizeHandle::Right => proposed.width,
            ResizeHandle::Top | ResizeHandle::Bottom => proposed.height * aspect_ratio,
            _ => proposed.width.max(proposed.height * aspect_ratio),
        }
    }
}

/// An interaction reported by the page view
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gesture {
    /// Proposed new top-left position
    Drag { x: f64, y: f64 },
    /// Proposed new rectangle as reported at the end of a resize
    Resize {
        handle: ResizeHandle,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

/// Apply a gesture to an overlay inside a container of `bounds`.
///
/// The result always lies within `bounds` and keeps the overlay's aspect
/// ratio. Proposals with non-finite coordinates leave the overlay unchanged.
pub fn apply_gesture(overlay: &Overlay, bounds: Size, min_width: f64, gesture: Gesture) -> Overlay {
    match gesture {
        Gesture::Drag { x, y } => drag(overlay, bounds, x, y),
        Gesture::Resize {
            handle,
            x,
            y,
            width,
            height,
        } => resize(
            overlay,
            bounds,
            min_width,
            handle,
            Rect::new(x, y, width, height),
        ),
    }
}

fn drag(overlay: &Overlay, bounds: Size, x: f64, y: f64) -> Overlay {
    if !x.is_finite() || !y.is_finite() {
        return *overlay;
    }
    let moved = Rect { x, y, ..overlay.rect };
    Overlay {
        rect: moved.clamp_position(bounds),
        aspect_ratio: overlay.aspect_ratio,
    }
}

fn resize(
    overlay: &Overlay,
    bounds: Size,
    min_width: f64,
    handle: ResizeHandle,
    proposed: Rect,
) -> Overlay {
    if !proposed.is_finite() {
        return *overlay;
    }
    let aspect_ratio = overlay.aspect_ratio;
    let (grows_right, grows_down) = handle.growth();

    // The corner opposite the handle stays put, taken from the reported rectangle
    let anchor_x = if grows_right {
        proposed.x
    } else {
        proposed.right()
    }
    .clamp(0.0, bounds.width);
    let anchor_y = if grows_down {
        proposed.y
    } else {
        proposed.bottom()
    }
    .clamp(0.0, bounds.height);

    let space_x = if grows_right {
        bounds.width - anchor_x
    } else {
        anchor_x
    };
    let space_y = if grows_down {
        bounds.height - anchor_y
    } else {
        anchor_y
    };

    let requested = handle
        .requested_width(&proposed, aspect_ratio)
        .max(min_width);
    let (width, height) = fit_width(requested, space_x, space_y, aspect_ratio);
    if width <= 0.0 || height <= 0.0 {
        // Anchor pinned against a container edge with no room to grow
        return *overlay;
    }

    let x = if grows_right { anchor_x } else { anchor_x - width };
    let y = if grows_down { anchor_y } else { anchor_y - height };

    Overlay {
        rect: Rect::new(x, y, width, height).clamp_position(bounds),
        aspect_ratio,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn container() -> impl Strategy<Value = Size> {
        (50.0f64..2000.0, 50.0f64..2000.0).prop_map(|(w, h)| Size::new(w, h))
    }

    fn handle() -> impl Strategy<Value = ResizeHandle> {
        prop_oneof![
            Just(ResizeHandle::TopLeft),
            Just(ResizeHandle::Top),
            Just(ResizeHandle::TopRight),
            Just(ResizeHandle::Right),
            Just(ResizeHandle::BottomRight),
            Just(ResizeHandle::Bottom),
            Just(ResizeHandle::BottomLeft),
            Just(ResizeHandle::Left),
        ]
    }

    fn gesture() -> impl Strategy<Value = Gesture> {
        prop_oneof![
            (-3000.0f64..3000.0, -3000.0f64..3000.0).prop_map(|(x, y)| Gesture::Drag { x, y }),
            (
                handle(),
                -3000.0f64..3000.0,
                -3000.0f64..3000.0,
                -100.0f64..4000.0,
                -100.0f64..4000.0
            )
                .prop_map(|(handle, x, y, width, height)| Gesture::Resize {
                    handle,
                    x,
                    y,
                    width,
                    height,
                }),
        ]
    }

    proptest! {
        /// Property: any sequence of gestures keeps the overlay inside its page
        /// and keeps width / height equal to the signature's aspect ratio.
        #[test]
        fn gestures_preserve_containment_and_aspect(
            bounds in container(),
            aspect_ratio in 0.1f64..10.0,
            gestures in prop::collection::vec(gesture(), 1..20),
        ) {
            let mut overlay = Overlay::initial(aspect_ratio, bounds, 0.8)
                .expect("measurable container");
            for gesture in gestures {
                overlay = apply_gesture(&overlay, bounds, 8.0, gesture);
                prop_assert!(
                    overlay.rect.is_within(bounds),
                    "overlay {:?} escaped {:?} after {:?}",
                    overlay.rect, bounds, gesture
                );
                let ratio = overlay.rect.width / overlay.rect.height;
                prop_assert!(
                    (ratio - aspect_ratio).abs() <= aspect_ratio * 1e-9,
                    "aspect drifted: {} vs {}",
                    ratio, aspect_ratio
                );
            }
        }
    }
}
