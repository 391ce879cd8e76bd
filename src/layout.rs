//! Page layout calculations
//!
//! Where page numbers are stamped, and the page sizes used for blank pages.
//! Everything here is pure; drawing happens in [`crate::pdf::stamp`].

use serde::{Deserialize, Serialize};

/// Where the page number goes on each page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PageNumberPosition {
    /// Near the left edge on every page
    Left,
    /// Near the right edge on every page
    Right,
    /// Outer edge of a bound spread: right on even indices, left on odd
    #[default]
    Outside,
    /// Inner edge of a bound spread: left on even indices, right on odd
    Inside,
    /// No page numbers
    None,
}

/// Text anchor in PDF points, measured from the bottom-left of the page box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

/// Page dimensions in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDimensions {
    pub width: f32,
    pub height: f32,
}

impl PageDimensions {
    /// US Letter size (8.5" × 11")
    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
        }
    }

    /// A4 size (210mm × 297mm)
    pub fn a4() -> Self {
        Self {
            width: 595.28,
            height: 841.89,
        }
    }
}

/// Margin constants for page-number placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementPolicy {
    /// Distance of the anchor from the left edge, and of the anchor from the
    /// right edge on right-hand placements
    pub side_margin: f32,
    /// Distance of the baseline from the bottom edge
    pub bottom_margin: f32,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            side_margin: 50.0,
            bottom_margin: 30.0,
        }
    }
}

impl PlacementPolicy {
    /// Anchor for the page at `page_index` (0-based) of a page `page_width` wide
    ///
    /// Returns `None` for [`PageNumberPosition::None`].
    pub fn anchor(&self, page_index: usize, position: PageNumberPosition, page_width: f32) -> Option<Anchor> {
        let near_left = self.side_margin;
        let near_right = page_width - self.side_margin;
        let even = page_index % 2 == 0;

        let x = match position {
            PageNumberPosition::None => return None,
            PageNumberPosition::Left => near_left,
            PageNumberPosition::Right => near_right,
            PageNumberPosition::Outside => {
                if even {
                    near_right
                } else {
                    near_left
                }
            }
            PageNumberPosition::Inside => {
                if even {
                    near_left
                } else {
                    near_right
                }
            }
        };

        Some(Anchor {
            x,
            y: self.bottom_margin,
        })
    }
}
