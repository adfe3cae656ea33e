// ============================================================
// Layer 3 — Figure Domain Type
// ============================================================
// A figure is a titled row of 2D panels. The evaluation step
// builds one with three panels (original, reduced, predicted);
// the metric sink decides how to persist it.

use ndarray::Array2;

/// One titled image inside a figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub title:  String,
    pub pixels: Array2<f32>,
}

/// A row of panels under a common title.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub title:  String,
    pub panels: Vec<Panel>,
}

impl Figure {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title:  title.into(),
            panels: Vec::new(),
        }
    }

    /// Append a panel (builder style).
    pub fn with_panel(mut self, title: impl Into<String>, pixels: Array2<f32>) -> Self {
        self.panels.push(Panel {
            title: title.into(),
            pixels,
        });
        self
    }

    /// Original / Reduced / Predicted comparison titled with the
    /// 1-based epoch number.
    pub fn comparison(
        epoch:     usize,
        original:  Array2<f32>,
        reduced:   Array2<f32>,
        predicted: Array2<f32>,
    ) -> Self {
        Self::new(format!("Epoch {}", epoch + 1))
            .with_panel("Original", original)
            .with_panel("Reduced", reduced)
            .with_panel("Predicted", predicted)
    }

    pub fn panel_titles(&self) -> Vec<&str> {
        self.panels.iter().map(|p| p.title.as_str()).collect()
    }
}
