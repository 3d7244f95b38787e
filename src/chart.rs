use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::Race;
use crate::overtime::OvertimeTable;

const FONT: &str = "Arial";
const LINE_WIDTH: u32 = 4;
const MARKER_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartOptions {
    pub title: String,
    pub subtitle: String,
    pub source: String,
    pub methodology: String,
    pub labels: BTreeMap<String, String>,
    pub palette: Vec<String>,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Households with Zero or Negative Net Wealth".to_string(),
            subtitle: "Estimated percentage of households by SCF racial demographics".to_string(),
            source: "Source: Survey of Consumer Finances & Institute for Policy Studies".to_string(),
            methodology: "Federal Reserve net wealth calculated with consumer durables removed"
                .to_string(),
            labels: default_labels(),
            palette: vec![
                "rgb(67,67,67)".to_string(),
                "rgb(115,115,115)".to_string(),
                "rgb(49,130,189)".to_string(),
                "rgb(189,189,189)".to_string(),
            ],
        }
    }
}

pub fn default_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (Race::WhiteNonHispanic.label().to_string(), "white".to_string()),
        (Race::Black.label().to_string(), "Black".to_string()),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x: Vec<u16>,
    pub y: Vec<Option<f64>>,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectgaps: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub data: Vec<Trace>,
    pub layout: Value,
}

impl Chart {
    pub fn title(&self) -> Option<&str> {
        self.layout
            .get("annotations")
            .and_then(|value| value.as_array())
            .and_then(|annotations| annotations.iter().find(|a| a.get("name") == Some(&json!("title"))))
            .and_then(|title| title.get("text"))
            .and_then(|text| text.as_str())
    }

    pub fn series_names(&self) -> Vec<&str> {
        self.data
            .iter()
            .filter_map(|trace| trace.name.as_deref())
            .collect()
    }
}

pub fn build_chart(table: &OvertimeTable, options: &ChartOptions) -> Chart {
    let years = table.years().to_vec();
    let categories = table.categories();
    let last_series = categories
        .last()
        .map(|category| table.series(category))
        .unwrap_or_default();

    let mut data = Vec::with_capacity(categories.len() * 2);
    let mut annotations = Vec::new();
    for (index, category) in categories.iter().enumerate() {
        let series = table.series(category);
        let color = palette_color(&options.palette, index);
        let label = options
            .labels
            .get(category)
            .cloned()
            .unwrap_or_else(|| category.clone());

        data.push(Trace {
            kind: "scatter",
            x: years.clone(),
            y: series.clone(),
            mode: "lines",
            name: Some(label.clone()),
            line: Some(json!({ "color": color, "width": LINE_WIDTH })),
            marker: None,
            connectgaps: Some(true),
        });

        let first = years.first().copied().zip(series.first().copied().flatten());
        let last = years.last().copied().zip(series.last().copied().flatten());
        let endpoints: Vec<(u16, f64)> = first.into_iter().chain(last).collect();
        data.push(Trace {
            kind: "scatter",
            x: endpoints.iter().map(|(year, _)| *year).collect(),
            y: endpoints.iter().map(|(_, value)| Some(*value)).collect(),
            mode: "markers",
            name: None,
            line: None,
            marker: Some(json!({ "color": color, "size": MARKER_SIZE })),
            connectgaps: None,
        });

        if let Some((_, value)) = first {
            annotations.push(json!({
                "xref": "paper", "x": 0.05, "y": value,
                "xanchor": "right", "yanchor": "middle",
                "text": format!("{label} {value:.1}%"),
                "font": { "family": FONT, "size": 16 },
                "showarrow": false,
            }));
        }
        // the last series' end label is drawn once, by the last series itself
        let repeats_last = index + 1 < categories.len() && series == last_series;
        if let (Some((_, value)), false) = (last, repeats_last) {
            annotations.push(json!({
                "xref": "paper", "x": 0.95, "y": value,
                "xanchor": "left", "yanchor": "middle",
                "text": format!("{value:.1}%"),
                "font": { "family": FONT, "size": 16 },
                "showarrow": false,
            }));
        }
    }

    let subtitle = match (years.first(), years.last()) {
        (Some(first), Some(last)) => format!("{} ({first}–{last})", options.subtitle),
        _ => options.subtitle.clone(),
    };
    annotations.push(json!({
        "name": "title",
        "xref": "paper", "yref": "paper", "x": 0.0, "y": 1.07,
        "xanchor": "left", "yanchor": "bottom",
        "text": options.title,
        "font": { "family": FONT, "size": 22, "color": "rgb(37,37,37)" },
        "showarrow": false,
    }));
    annotations.push(json!({
        "name": "subtitle",
        "xref": "paper", "yref": "paper", "x": 0.0, "y": 1.0,
        "xanchor": "left", "yanchor": "bottom",
        "text": subtitle,
        "font": { "family": FONT, "size": 14, "color": "rgb(37,37,37)" },
        "showarrow": false,
    }));
    annotations.push(json!({
        "name": "source",
        "xref": "paper", "yref": "paper", "x": 0.5, "y": -0.1,
        "xanchor": "center", "yanchor": "top",
        "text": options.source,
        "font": { "family": FONT, "size": 12, "color": "rgb(150,150,150)" },
        "showarrow": false,
    }));
    annotations.push(json!({
        "name": "methodology",
        "xref": "paper", "yref": "paper", "x": 0.5, "y": -0.16,
        "xanchor": "center", "yanchor": "top",
        "text": options.methodology,
        "font": { "family": FONT, "size": 12, "color": "rgb(150,150,150)" },
        "showarrow": false,
    }));

    let layout = json!({
        "xaxis": {
            "showline": true,
            "showgrid": false,
            "showticklabels": true,
            "linecolor": "rgb(204, 204, 204)",
            "linewidth": 2,
            "ticks": "outside",
            "tickfont": { "family": FONT, "size": 12, "color": "rgb(82, 82, 82)" },
        },
        "yaxis": {
            "showgrid": false,
            "zeroline": false,
            "showline": false,
            "showticklabels": false,
        },
        "autosize": false,
        "margin": { "autoexpand": false, "l": 100, "r": 20, "t": 110 },
        "showlegend": false,
        "plot_bgcolor": "white",
        "annotations": annotations,
    });

    Chart { data, layout }
}

fn palette_color(palette: &[String], index: usize) -> &str {
    if palette.is_empty() {
        return "rgb(67,67,67)";
    }
    &palette[index % palette.len()]
}
