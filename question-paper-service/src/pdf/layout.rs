//! Grid arithmetic for placing question images on pages.
//!
//! Coordinates here are measured in PDF points from the top-left corner of
//! the page; the renderer flips them into PDF user space.

/// Columns and rows of image cells on each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    pub columns: usize,
    pub rows: usize,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            columns: 2,
            rows: 4,
        }
    }
}

/// Where a single image lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSlot {
    pub page: usize,
    pub column: usize,
    pub row: usize,
}

impl CellSlot {
    /// First cell of its page; the title block is written here.
    pub fn starts_page(&self) -> bool {
        self.column == 0 && self.row == 0
    }
}

impl GridSpec {
    pub fn per_page(&self) -> usize {
        self.columns * self.rows
    }

    pub fn slot(&self, index: usize) -> CellSlot {
        let position = index % self.per_page();
        CellSlot {
            page: index / self.per_page(),
            column: position % self.columns,
            row: position / self.columns,
        }
    }

    pub fn page_count(&self, images: usize) -> usize {
        images.div_ceil(self.per_page())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Physical page and spacing, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub column_gap: f32,
    pub row_gap: f32,
}

impl PageGeometry {
    pub const A4: PageGeometry = PageGeometry {
        width: 595.28,
        height: 841.89,
        margin: 40.0,
        column_gap: 24.0,
        row_gap: 12.0,
    };

    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    pub fn divider_x(&self) -> f32 {
        self.width / 2.0
    }

    /// Rectangle of the cell at `(column, row)` inside the band between
    /// `area_top` and `area_bottom`.
    ///
    /// Columns are laid out symmetrically around the divider, half a gap on
    /// each side of it.
    pub fn cell_rect(
        &self,
        grid: &GridSpec,
        area_top: f32,
        area_bottom: f32,
        column: usize,
        row: usize,
    ) -> Rect {
        let columns = grid.columns as f32;
        let rows = grid.rows as f32;

        let cell_width = (self.content_width() - self.column_gap * (columns - 1.0)) / columns;
        let band = (area_bottom - area_top).max(0.0);
        let cell_height = ((band - self.row_gap * (rows - 1.0)) / rows).max(0.0);

        Rect {
            x: self.margin + column as f32 * (cell_width + self.column_gap),
            y: area_top + row as f32 * (cell_height + self.row_gap),
            width: cell_width,
            height: cell_height,
        }
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::A4
    }
}

/// Largest rectangle with the image's aspect ratio that fits in `cell`,
/// centred on both axes.
pub fn fit_within(image_width: u32, image_height: u32, cell: Rect) -> Rect {
    if image_width == 0 || image_height == 0 || cell.width <= 0.0 || cell.height <= 0.0 {
        return Rect {
            x: cell.x + cell.width / 2.0,
            y: cell.y + cell.height / 2.0,
            width: 0.0,
            height: 0.0,
        };
    }

    let scale = (cell.width / image_width as f32).min(cell.height / image_height as f32);
    let width = image_width as f32 * scale;
    let height = image_height as f32 * scale;

    Rect {
        x: cell.x + (cell.width - width) / 2.0,
        y: cell.y + (cell.height - height) / 2.0,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 0.01;

    #[test]
    fn three_images_fill_first_row_then_second() {
        let grid = GridSpec::default();
        let cells: Vec<(usize, usize, usize)> = (0..3)
            .map(|i| grid.slot(i))
            .map(|s| (s.page, s.row, s.column))
            .collect();
        assert_eq!(cells, vec![(0, 0, 0), (0, 0, 1), (0, 1, 0)]);
    }

    #[test]
    fn ninth_image_starts_second_page() {
        let grid = GridSpec::default();
        assert_eq!(
            grid.slot(7),
            CellSlot {
                page: 0,
                column: 1,
                row: 3
            }
        );
        let ninth = grid.slot(8);
        assert_eq!(ninth.page, 1);
        assert!(ninth.starts_page());
        assert!(!grid.slot(9).starts_page());
    }

    #[test]
    fn page_count_rounds_up() {
        let grid = GridSpec::default();
        assert_eq!(grid.page_count(0), 0);
        assert_eq!(grid.page_count(1), 1);
        assert_eq!(grid.page_count(8), 1);
        assert_eq!(grid.page_count(9), 2);
        assert_eq!(grid.page_count(60), 8);
    }

    #[test]
    fn columns_sit_either_side_of_divider() {
        let page = PageGeometry::A4;
        let grid = GridSpec::default();
        let left = page.cell_rect(&grid, 100.0, 800.0, 0, 0);
        let right = page.cell_rect(&grid, 100.0, 800.0, 1, 0);

        assert!((left.x - page.margin).abs() < EPS);
        assert!((page.divider_x() - left.right() - page.column_gap / 2.0).abs() < EPS);
        assert!((right.x - page.divider_x() - page.column_gap / 2.0).abs() < EPS);
        assert!((right.right() - (page.width - page.margin)).abs() < EPS);
    }

    #[test]
    fn rows_divide_the_band() {
        let page = PageGeometry::A4;
        let grid = GridSpec::default();
        let first = page.cell_rect(&grid, 100.0, 800.0, 0, 0);
        let last = page.cell_rect(&grid, 100.0, 800.0, 0, 3);

        assert!((first.y - 100.0).abs() < EPS);
        assert!((last.bottom() - 800.0).abs() < EPS);
        assert!((first.height - last.height).abs() < EPS);
    }

    #[test]
    fn wide_image_is_letterboxed() {
        let cell = Rect {
            x: 10.0,
            y: 20.0,
            width: 200.0,
            height: 100.0,
        };
        let fitted = fit_within(400, 100, cell);

        assert!((fitted.width - 200.0).abs() < EPS);
        assert!((fitted.height - 50.0).abs() < EPS);
        assert!((fitted.x - 10.0).abs() < EPS);
        assert!((fitted.y - 45.0).abs() < EPS);
    }

    #[test]
    fn tall_image_is_pillarboxed() {
        let cell = Rect {
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 100.0,
        };
        let fitted = fit_within(50, 100, cell);

        assert!((fitted.height - 100.0).abs() < EPS);
        assert!((fitted.width - 50.0).abs() < EPS);
        assert!((fitted.x - 75.0).abs() < EPS);
        assert!(fitted.right() <= cell.right() + EPS);
    }

    #[test]
    fn small_images_are_scaled_up_to_the_cell() {
        let cell = Rect {
            x: 0.0,
            y: 0.0,
            width: 120.0,
            height: 120.0,
        };
        let fitted = fit_within(12, 6, cell);
        assert!((fitted.width - 120.0).abs() < EPS);
        assert!((fitted.height - 60.0).abs() < EPS);
    }

    #[test]
    fn degenerate_image_collapses_to_cell_centre() {
        let cell = Rect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 40.0,
        };
        let fitted = fit_within(0, 10, cell);
        assert_eq!(fitted.width, 0.0);
        assert!((fitted.x - 50.0).abs() < EPS);
    }
}
