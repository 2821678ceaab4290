use super::{Comparison, ReportRenderer};

const BAR_WIDTH: f64 = 18.0;
const GROUP_WIDTH: f64 = 56.0;
const PLOT_HEIGHT: f64 = 240.0;
const MARGIN: f64 = 40.0;
const LAST_COLOR: &str = "#c23531";
const CUR_COLOR: &str = "#2f4554";

/// Grouped bar chart of the normalised pairs as a standalone HTML page.
///
/// The x axis is labelled `p0..pN` in schema order; [`ChartRenderer::legend`]
/// maps the labels back to field names.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    title: String,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self::new("scale out stats")
    }
}

impl ChartRenderer {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
        }
    }

    pub fn legend(comparison: &Comparison) -> String {
        let mut text = String::from("Label:\n");
        for (i, pair) in comparison.pairs().iter().enumerate() {
            text.push_str(&format!("p{}: {}\n", i, pair.field.name()));
            text.push_str(&format!("standard(last, red) is {:.6}\n", pair.previous));
        }
        text
    }

    fn svg(&self, comparison: &Comparison) -> String {
        let (last, cur) = comparison.normalized();
        let max = last
            .iter()
            .chain(cur.iter())
            .copied()
            .filter(|v| v.is_finite())
            .fold(1.0, f64::max);
        let width = MARGIN * 2.0 + GROUP_WIDTH * last.len() as f64;
        let height = MARGIN * 2.0 + PLOT_HEIGHT;
        let baseline = MARGIN + PLOT_HEIGHT;

        let mut svg = String::new();
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{:.0}\" height=\"{:.0}\">\n",
            width, height
        ));
        svg.push_str(&format!(
            "<line x1=\"{m}\" y1=\"{b}\" x2=\"{w}\" y2=\"{b}\" stroke=\"black\"/>\n",
            m = MARGIN,
            b = baseline,
            w = width - MARGIN
        ));
        for (i, (l, c)) in last.iter().zip(cur.iter()).enumerate() {
            let x = MARGIN + GROUP_WIDTH * i as f64 + (GROUP_WIDTH - 2.0 * BAR_WIDTH) / 2.0;
            for (offset, value, color) in [(0.0, *l, LAST_COLOR), (BAR_WIDTH, *c, CUR_COLOR)] {
                let h = if value.is_finite() { value / max * PLOT_HEIGHT } else { 0.0 };
                svg.push_str(&format!(
                    "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{}\" height=\"{:.1}\" fill=\"{}\"><title>{:.3}</title></rect>\n",
                    x + offset,
                    baseline - h,
                    BAR_WIDTH,
                    h,
                    color,
                    value
                ));
            }
            svg.push_str(&format!(
                "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\" text-anchor=\"middle\">p{}</text>\n",
                x + BAR_WIDTH,
                baseline + 16.0,
                i
            ));
        }
        svg.push_str(&format!(
            "<text x=\"{m}\" y=\"20\" fill=\"{}\">last</text><text x=\"{:.0}\" y=\"20\" fill=\"{}\">cur</text>\n",
            LAST_COLOR,
            MARGIN + 40.0,
            CUR_COLOR,
            m = MARGIN
        ));
        svg.push_str("</svg>\n");
        svg
    }
}

impl ReportRenderer for ChartRenderer {
    fn name(&self) -> &'static str {
        "chart"
    }

    fn render(&self, comparison: &Comparison) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h3>{title}</h3>\n{svg}<pre>{legend}</pre>\n</body>\n</html>\n",
            title = self.title,
            svg = self.svg(comparison),
            legend = Self::legend(comparison)
        )
    }
}
