//! Chart rendering
//!
//! Services hand numeric series to a [`ChartRenderer`] and embed whatever
//! encoded image it returns. The bundled renderer writes a small SVG and
//! returns it as a base64 data URI.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt::Write;

/// Turns numeric series into an encoded image
pub trait ChartRenderer: Send + Sync {
    /// Horizontal bar chart, one bar per `(label, value)` in the given order.
    /// Bar length follows the magnitude; negative values are drawn in a
    /// second colour.
    fn bar_chart(&self, title: &str, bars: &[(String, f64)]) -> String;

    /// Annotated 2x2 heatmap. `matrix[actual][predicted]`.
    fn confusion_heatmap(&self, title: &str, labels: [&str; 2], matrix: [[usize; 2]; 2]) -> String;
}

/// Renders SVG documents encoded as `data:image/svg+xml;base64,...`
#[derive(Debug, Clone)]
pub struct SvgChartRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self {
            width: 640,
            height: 400,
        }
    }
}

impl SvgChartRenderer {
    fn encode(svg: &str) -> String {
        format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg.as_bytes()))
    }

    fn open(&self, title: &str) -> String {
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\
             <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\
             <text x=\"{cx}\" y=\"24\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"16\" font-weight=\"bold\">{t}</text>",
            w = self.width,
            h = self.height,
            cx = self.width / 2,
            t = escape(title)
        )
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn bar_chart(&self, title: &str, bars: &[(String, f64)]) -> String {
        let mut svg = self.open(title);
        let left = 150.0;
        let top = 44.0;
        let plot_w = self.width as f64 - left - 60.0;
        let slot = if bars.is_empty() {
            0.0
        } else {
            (self.height as f64 - top - 20.0) / bars.len() as f64
        };
        let max = bars.iter().map(|(_, v)| v.abs()).fold(0.0, f64::max);

        for (i, (label, value)) in bars.iter().enumerate() {
            let y = top + i as f64 * slot;
            let w = if max > 0.0 { plot_w * value.abs() / max } else { 0.0 };
            let fill = if *value < 0.0 { "#c44e52" } else { "#4c72b0" };
            let _ = write!(
                svg,
                "<text x=\"{lx}\" y=\"{ty:.1}\" text-anchor=\"end\" font-family=\"sans-serif\" font-size=\"12\">{label}</text>\
                 <rect x=\"{left}\" y=\"{ry:.1}\" width=\"{w:.1}\" height=\"{bh:.1}\" fill=\"{fill}\"/>\
                 <text x=\"{vx:.1}\" y=\"{ty:.1}\" font-family=\"sans-serif\" font-size=\"11\">{value:.3}</text>",
                lx = left - 8.0,
                ty = y + slot * 0.55,
                label = escape(label),
                ry = y + slot * 0.15,
                bh = slot * 0.7,
                vx = left + w + 4.0,
            );
        }

        svg.push_str("</svg>");
        Self::encode(&svg)
    }

    fn confusion_heatmap(&self, title: &str, labels: [&str; 2], matrix: [[usize; 2]; 2]) -> String {
        let mut svg = self.open(title);
        let cell = ((self.height as f64 - 120.0) / 2.0).min((self.width as f64 - 200.0) / 2.0);
        let x0 = (self.width as f64 - 2.0 * cell) / 2.0 + 30.0;
        let y0 = 60.0;
        let max = matrix.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;

        for (r, row) in matrix.iter().enumerate() {
            for (c, &count) in row.iter().enumerate() {
                let shade = 235.0 - 180.0 * count as f64 / max;
                let x = x0 + c as f64 * cell;
                let y = y0 + r as f64 * cell;
                let text = if shade < 140.0 { "white" } else { "black" };
                let _ = write!(
                    svg,
                    "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{cell:.1}\" height=\"{cell:.1}\" fill=\"rgb({s},{s},255)\" stroke=\"white\"/>\
                     <text x=\"{tx:.1}\" y=\"{ty:.1}\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"20\" fill=\"{text}\">{count}</text>",
                    s = shade as u8,
                    tx = x + cell / 2.0,
                    ty = y + cell / 2.0 + 7.0,
                );
            }
        }

        for (i, label) in labels.iter().enumerate() {
            let _ = write!(
                svg,
                "<text x=\"{px:.1}\" y=\"{py:.1}\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"12\">{l}</text>\
                 <text x=\"{ax:.1}\" y=\"{ay:.1}\" text-anchor=\"end\" font-family=\"sans-serif\" font-size=\"12\">{l}</text>",
                px = x0 + (i as f64 + 0.5) * cell,
                py = y0 + 2.0 * cell + 20.0,
                ax = x0 - 8.0,
                ay = y0 + (i as f64 + 0.5) * cell,
                l = escape(label),
            );
        }
        let _ = write!(
            svg,
            "<text x=\"{cx:.1}\" y=\"{by:.1}\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"13\">Predicted</text>\
             <text x=\"20\" y=\"{my:.1}\" font-family=\"sans-serif\" font-size=\"13\" transform=\"rotate(-90 20 {my:.1})\">Actual</text>",
            cx = x0 + cell,
            by = y0 + 2.0 * cell + 42.0,
            my = y0 + cell,
        );

        svg.push_str("</svg>");
        Self::encode(&svg)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
