//! Bar-chart rendering of array snapshots.
//!
//! [`BarChart`] draws onto a character canvas: one column span per element,
//! bar height proportional to `value / max(snapshot)`. When there are more
//! elements than columns, each column shows the element under its left edge.

/// Draws a snapshot. Called repeatedly with snapshots of any length.
pub trait SnapshotRenderer {
    fn render(&mut self, values: &[f32]);
}

const FILLED: char = '█';
const EMPTY: char = ' ';

/// Fixed-size character canvas holding the last rendered frame.
#[derive(Debug, Clone)]
pub struct BarChart {
    width: usize,
    height: usize,
    cells: Vec<char>,
}

impl BarChart {
    pub fn new(width: usize, height: usize) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            cells: vec![EMPTY; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Height in rows of each canvas column for `values`.
    pub fn column_heights(&self, values: &[f32]) -> Vec<usize> {
        if values.is_empty() {
            return vec![0; self.width];
        }
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let scale = if max.is_finite() && max > 0.0 {
            self.height as f32 / max
        } else {
            0.0
        };

        (0..self.width)
            .map(|col| {
                let index = col * values.len() / self.width;
                let bar = values[index] * scale;
                if bar.is_finite() && bar > 0.0 {
                    (bar.round() as usize).min(self.height)
                } else {
                    0
                }
            })
            .collect()
    }

    /// The current frame, top row first, one line per row.
    pub fn frame(&self) -> String {
        let mut out = String::with_capacity((self.width * 3 + 1) * self.height);
        for row in self.cells.chunks(self.width) {
            out.extend(row.iter());
            out.push('\n');
        }
        out
    }
}

impl SnapshotRenderer for BarChart {
    fn render(&mut self, values: &[f32]) {
        self.cells.fill(EMPTY);
        for (col, bar) in self.column_heights(values).into_iter().enumerate() {
            for row in (self.height - bar)..self.height {
                self.cells[row * self.width + col] = FILLED;
            }
        }
    }
}

/// Prints each rendered frame to stdout, clearing the terminal first.
#[derive(Debug)]
pub struct TerminalChart {
    chart: BarChart,
    caption: Option<String>,
}

impl TerminalChart {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            chart: BarChart::new(width, height),
            caption: None,
        }
    }

    /// Line printed under the next frames.
    pub fn set_caption(&mut self, caption: impl Into<String>) {
        self.caption = Some(caption.into());
    }
}

impl SnapshotRenderer for TerminalChart {
    fn render(&mut self, values: &[f32]) {
        self.chart.render(values);
        // ANSI: clear screen, cursor home
        print!("\x1b[2J\x1b[H{}", self.chart.frame());
        if let Some(caption) = &self.caption {
            println!("{caption}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_scale_to_max() {
        let chart = BarChart::new(4, 8);
        assert_eq!(chart.column_heights(&[1.0, 2.0, 4.0, 0.0]), vec![2, 4, 8, 0]);
    }

    #[test]
    fn test_render_frame() {
        let mut chart = BarChart::new(3, 2);
        chart.render(&[1.0, 2.0, 0.0]);
        assert_eq!(chart.frame(), " █ \n██ \n");
    }

    #[test]
    fn test_wide_elements_span_columns() {
        let chart = BarChart::new(4, 4);
        assert_eq!(chart.column_heights(&[1.0, 2.0]), vec![2, 2, 4, 4]);
    }

    #[test]
    fn test_more_elements_than_columns() {
        let chart = BarChart::new(2, 4);
        let heights = chart.column_heights(&[4.0, 0.0, 2.0, 0.0]);
        assert_eq!(heights, vec![4, 2]);
    }

    #[test]
    fn test_degenerate_snapshots() {
        let mut chart = BarChart::new(3, 3);
        assert_eq!(chart.column_heights(&[]), vec![0, 0, 0]);
        assert_eq!(chart.column_heights(&[0.0, 0.0]), vec![0, 0, 0]);
        assert_eq!(chart.column_heights(&[-1.0, 3.0, -2.0]), vec![0, 3, 0]);
        chart.render(&[]);
        assert_eq!(chart.frame(), "   \n   \n   \n");
    }

    #[test]
    fn test_changing_lengths() {
        let mut chart = BarChart::new(4, 2);
        chart.render(&[1.0; 4]);
        chart.render(&[1.0]);
        assert_eq!(chart.frame(), "████\n████\n");
    }
}
