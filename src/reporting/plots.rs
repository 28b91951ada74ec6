//! Plotly figure specifications for the model comparison charts

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HybridError, Result};
use crate::training::{ModelKind, ModelMetrics, TrainingResult};

/// Metric names on the radar axes, in wire order
pub const RADAR_METRICS: [&str; 5] = ["accuracy", "precision", "recall", "f1_score", "roc_auc"];

/// Plotly's qualitative Set1 palette
const SET1: [&str; 3] = ["rgb(228,26,28)", "rgb(55,126,184)", "rgb(77,175,74)"];

const GRID_ROWS: usize = 2;
const GRID_COLS: usize = 3;
const HORIZONTAL_SPACING: f64 = 0.2 / GRID_COLS as f64;
const VERTICAL_SPACING: f64 = 0.3 / GRID_ROWS as f64;

/// Which chart layout to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotStyle {
    /// Six-panel analysis grid
    #[default]
    Full,
    /// One grouped bar chart
    Simple,
}

impl FromStr for PlotStyle {
    type Err = HybridError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(PlotStyle::Full),
            "simple" => Ok(PlotStyle::Simple),
            other => Err(HybridError::InvalidParameter {
                name: "plot_style".to_string(),
                value: other.to_string(),
                reason: "expected 'full' or 'simple'".to_string(),
            }),
        }
    }
}

impl fmt::Display for PlotStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlotStyle::Full => write!(f, "full"),
            PlotStyle::Simple => write!(f, "simple"),
        }
    }
}

/// A Plotly figure: traces plus layout
#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

impl Figure {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Bar(BarTrace),
    Scatter(ScatterTrace),
    Scatterpolar(PolarTrace),
}

#[derive(Debug, Clone, Serialize)]
pub struct BarTrace {
    pub name: String,
    pub x: Vec<String>,
    pub y: Vec<f64>,
    pub marker: Marker,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScatterTrace {
    pub name: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub mode: String,
    pub text: Vec<String>,
    pub textposition: String,
    pub marker: Marker,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolarTrace {
    pub name: String,
    pub r: Vec<f64>,
    pub theta: Vec<String>,
    pub fill: String,
    pub line: Line,
    pub subplot: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub color: MarkerColor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
}

/// One color for the trace or one per point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MarkerColor {
    Single(String),
    PerPoint(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Line {
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Title {
    pub text: String,
}

impl Title {
    fn new(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolarDomain {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

#[derive(Debug, Clone, Serialize)]
pub struct RadialAxis {
    pub visible: bool,
    pub range: [f64; 2],
}

#[derive(Debug, Clone, Serialize)]
pub struct Polar {
    pub domain: PolarDomain,
    pub radialaxis: RadialAxis,
}

/// Subplot title, positioned in paper coordinates
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub xref: String,
    pub yref: String,
    pub xanchor: String,
    pub yanchor: String,
    pub showarrow: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub title: Title,
    pub height: u32,
    pub showlegend: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<String>,
    /// Cartesian axes keyed `xaxis`, `yaxis2`, ...
    #[serde(flatten)]
    pub axes: BTreeMap<String, Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polar: Option<Polar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

/// Builds the comparison figure for a training result
#[derive(Debug, Clone, Copy, Default)]
pub struct PlotBuilder {
    style: PlotStyle,
}

impl PlotBuilder {
    pub fn new(style: PlotStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> PlotStyle {
        self.style
    }

    /// Figure for `result`; `top_models` are highlighted in the full style
    pub fn build(&self, result: &TrainingResult, top_models: &[ModelKind]) -> Figure {
        match self.style {
            PlotStyle::Full => full_figure(result, top_models),
            PlotStyle::Simple => simple_figure(result),
        }
    }

    /// Figure serialized as a JSON string
    pub fn build_json(&self, result: &TrainingResult, top_models: &[ModelKind]) -> Result<String> {
        self.build(result, top_models).to_json()
    }
}

fn model_names(result: &TrainingResult) -> Vec<String> {
    result.records().iter().map(|r| r.model.name().to_string()).collect()
}

fn metric_column(result: &TrainingResult, metric: impl Fn(&ModelMetrics) -> f64) -> Vec<f64> {
    result.records().iter().map(|r| metric(&r.metrics)).collect()
}

fn radar_values(metrics: &ModelMetrics) -> Vec<f64> {
    vec![
        metrics.accuracy,
        metrics.precision,
        metrics.recall,
        metrics.f1_score,
        metrics.roc_auc,
    ]
}

fn bar(name: &str, x: Vec<String>, y: Vec<f64>, color: MarkerColor, cell: Option<usize>) -> Trace {
    Trace::Bar(BarTrace {
        name: name.to_string(),
        x,
        y,
        marker: Marker { color, size: None },
        xaxis: cell.map(|i| axis_ref("x", i)),
        yaxis: cell.map(|i| axis_ref("y", i)),
    })
}

/// Trace-side axis reference: `x`, `x2`, ...
fn axis_ref(prefix: &str, index: usize) -> String {
    if index == 1 {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, index)
    }
}

/// Layout-side axis key: `xaxis`, `xaxis2`, ...
fn axis_key(prefix: &str, index: usize) -> String {
    if index == 1 {
        format!("{}axis", prefix)
    } else {
        format!("{}axis{}", prefix, index)
    }
}

/// Paper-coordinate domains of a grid cell, rows counted from the top
fn cell_domain(row: usize, col: usize) -> ([f64; 2], [f64; 2]) {
    let width = (1.0 - HORIZONTAL_SPACING * (GRID_COLS - 1) as f64) / GRID_COLS as f64;
    let height = (1.0 - VERTICAL_SPACING * (GRID_ROWS - 1) as f64) / GRID_ROWS as f64;
    let x0 = col as f64 * (width + HORIZONTAL_SPACING);
    let y1 = 1.0 - row as f64 * (height + VERTICAL_SPACING);
    ([x0, (x0 + width).min(1.0)], [(y1 - height).max(0.0), y1])
}

fn full_figure(result: &TrainingResult, top_models: &[ModelKind]) -> Figure {
    let names = model_names(result);
    let single = |c: &str| MarkerColor::Single(c.to_string());

    // (row, col, title); the polar panel sits at (1, 1)
    let panels = [
        (0, 0, "Accuracy Comparison"),
        (0, 1, "Precision vs Recall"),
        (0, 2, "F1-Score Distribution"),
        (1, 0, "ROC-AUC Scores"),
        (1, 1, "Overall Performance"),
        (1, 2, "Model Ranking"),
    ];

    let mut axes = BTreeMap::new();
    let mut annotations = Vec::new();
    let mut polar = None;
    let mut cartesian = 0;
    for (row, col, title) in panels {
        let (x_domain, y_domain) = cell_domain(row, col);
        annotations.push(Annotation {
            text: title.to_string(),
            x: (x_domain[0] + x_domain[1]) / 2.0,
            y: y_domain[1],
            xref: "paper".to_string(),
            yref: "paper".to_string(),
            xanchor: "center".to_string(),
            yanchor: "bottom".to_string(),
            showarrow: false,
        });
        if (row, col) == (1, 1) {
            polar = Some(Polar {
                domain: PolarDomain { x: x_domain, y: y_domain },
                radialaxis: RadialAxis {
                    visible: true,
                    range: [0.0, 1.0],
                },
            });
            continue;
        }
        cartesian += 1;
        axes.insert(
            axis_key("x", cartesian),
            Axis {
                domain: Some(x_domain),
                anchor: Some(axis_ref("y", cartesian)),
                title: None,
            },
        );
        axes.insert(
            axis_key("y", cartesian),
            Axis {
                domain: Some(y_domain),
                anchor: Some(axis_ref("x", cartesian)),
                title: None,
            },
        );
    }

    let mut data = vec![
        bar(
            "Accuracy",
            names.clone(),
            metric_column(result, |m| m.accuracy),
            single("lightblue"),
            Some(1),
        ),
        Trace::Scatter(ScatterTrace {
            name: "Precision vs Recall".to_string(),
            x: metric_column(result, |m| m.precision),
            y: metric_column(result, |m| m.recall),
            mode: "markers+text".to_string(),
            text: names.clone(),
            textposition: "top center".to_string(),
            marker: Marker {
                color: single("red"),
                size: Some(10.0),
            },
            xaxis: Some(axis_ref("x", 2)),
            yaxis: Some(axis_ref("y", 2)),
        }),
        bar(
            "F1-Score",
            names.clone(),
            metric_column(result, |m| m.f1_score),
            single("lightgreen"),
            Some(3),
        ),
        bar(
            "ROC-AUC",
            names,
            metric_column(result, |m| m.roc_auc),
            single("orange"),
            Some(4),
        ),
    ];

    for (kind, color) in top_models.iter().take(SET1.len()).zip(SET1) {
        if let Some(record) = result.get(*kind) {
            data.push(Trace::Scatterpolar(PolarTrace {
                name: kind.name().to_string(),
                r: radar_values(&record.metrics),
                theta: RADAR_METRICS.iter().map(|m| m.to_string()).collect(),
                fill: "toself".to_string(),
                line: Line {
                    color: color.to_string(),
                },
                subplot: "polar".to_string(),
            }));
        }
    }

    let ranked = result.top_k(result.len());
    let ranked_colors = (0..ranked.len())
        .map(|i| if i < 3 { "gold" } else { "lightgray" }.to_string())
        .collect();
    data.push(bar(
        "Ranking",
        ranked.iter().map(|k| k.name().to_string()).collect(),
        ranked
            .iter()
            .filter_map(|k| result.get(*k))
            .map(|r| r.metrics.accuracy)
            .collect(),
        MarkerColor::PerPoint(ranked_colors),
        Some(5),
    ));

    Figure {
        data,
        layout: Layout {
            title: Title::new("Machine Learning Model Performance Analysis"),
            height: 800,
            showlegend: true,
            barmode: None,
            axes,
            polar,
            annotations,
        },
    }
}

fn simple_figure(result: &TrainingResult) -> Figure {
    let names = model_names(result);
    let series: [(&str, &str, fn(&ModelMetrics) -> f64); 4] = [
        ("Accuracy", "lightblue", |m| m.accuracy),
        ("Precision", "lightgreen", |m| m.precision),
        ("Recall", "orange", |m| m.recall),
        ("F1-Score", "lightcoral", |m| m.f1_score),
    ];

    let data = series
        .iter()
        .map(|(name, color, metric)| {
            bar(
                name,
                names.clone(),
                metric_column(result, metric),
                MarkerColor::Single(color.to_string()),
                None,
            )
        })
        .collect();

    let mut axes = BTreeMap::new();
    axes.insert(
        "xaxis".to_string(),
        Axis {
            title: Some(Title::new("Models")),
            ..Default::default()
        },
    );
    axes.insert(
        "yaxis".to_string(),
        Axis {
            title: Some(Title::new("Performance Score")),
            ..Default::default()
        },
    );

    Figure {
        data,
        layout: Layout {
            title: Title::new("Machine Learning Model Performance Comparison"),
            height: 600,
            showlegend: true,
            barmode: Some("group".to_string()),
            axes,
            polar: None,
            annotations: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ModelRecord;
    use serde_json::Value;

    fn result() -> TrainingResult {
        TrainingResult::new(
            ModelKind::ALL
                .iter()
                .enumerate()
                .map(|(i, &model)| {
                    let score = 0.5 + 0.05 * i as f64;
                    ModelRecord {
                        model,
                        metrics: ModelMetrics {
                            accuracy: score,
                            precision: score,
                            recall: score,
                            f1_score: score,
                            roc_auc: score,
                        },
                        error: None,
                    }
                })
                .collect(),
        )
    }

    fn parse(figure: &Figure) -> Value {
        serde_json::from_str(&figure.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_full_figure_panels() {
        let result = result();
        let top = result.top_k(3);
        let figure = PlotBuilder::default().build(&result, &top);
        let json = parse(&figure);

        assert_eq!(json["layout"]["height"], 800);
        assert_eq!(
            json["layout"]["title"]["text"],
            "Machine Learning Model Performance Analysis"
        );
        let titles: Vec<&str> = json["layout"]["annotations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["text"].as_str().unwrap())
            .collect();
        assert_eq!(
            titles,
            vec![
                "Accuracy Comparison",
                "Precision vs Recall",
                "F1-Score Distribution",
                "ROC-AUC Scores",
                "Overall Performance",
                "Model Ranking",
            ]
        );

        let traces = json["data"].as_array().unwrap();
        // 4 panels + 3 radar traces + ranking
        assert_eq!(traces.len(), 8);
        let polar: Vec<&Value> = traces.iter().filter(|t| t["type"] == "scatterpolar").collect();
        assert_eq!(polar.len(), 3);
        assert_eq!(polar[0]["name"], "Gradient Boosting");
        assert_eq!(polar[0]["theta"].as_array().unwrap().len(), 5);

        let ranking = traces.last().unwrap();
        assert_eq!(ranking["xaxis"], "x5");
        assert_eq!(ranking["x"][0], "Gradient Boosting");
        let colors = ranking["marker"]["color"].as_array().unwrap();
        assert_eq!(colors.iter().filter(|c| *c == "gold").count(), 3);
        assert_eq!(colors[3], "lightgray");

        assert!(json["layout"]["xaxis5"].is_object());
        assert!(json["layout"]["xaxis6"].is_null());
        assert!(json["layout"]["polar"]["domain"]["x"].is_array());
    }

    #[test]
    fn test_simple_figure() {
        let figure = PlotBuilder::new(PlotStyle::Simple).build(&result(), &[]);
        let json = parse(&figure);

        assert_eq!(json["layout"]["height"], 600);
        assert_eq!(json["layout"]["barmode"], "group");
        assert_eq!(json["layout"]["xaxis"]["title"]["text"], "Models");
        let traces = json["data"].as_array().unwrap();
        let names: Vec<&str> = traces.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Accuracy", "Precision", "Recall", "F1-Score"]);
        assert!(traces.iter().all(|t| t["x"].as_array().unwrap().len() == 8));
        assert!(json["layout"].get("annotations").is_none());
    }

    #[test]
    fn test_cell_domains_stay_on_paper() {
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                let (x, y) = cell_domain(row, col);
                assert!(0.0 <= x[0] && x[0] < x[1] && x[1] <= 1.0);
                assert!(0.0 <= y[0] && y[0] < y[1] && y[1] <= 1.0);
            }
        }
        assert_eq!(cell_domain(0, 0).1[1], 1.0);
    }

    #[test]
    fn test_plot_style_parse() {
        assert_eq!("Simple".parse::<PlotStyle>().unwrap(), PlotStyle::Simple);
        assert_eq!("full".parse::<PlotStyle>().unwrap(), PlotStyle::Full);
        assert!("pie".parse::<PlotStyle>().is_err());
        assert_eq!(PlotStyle::default().to_string(), "full");
    }
}
