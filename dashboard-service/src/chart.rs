use plotly::{
    common::Mode,
    layout::{Axis, AxisType, Margin},
    Layout, Plot, Scatter,
};
use telemetry_client::{domain::merged_table::format_timestamp, MetricRecord};

/// Gas production over time; records without a timestamp are not plotted.
pub fn gas_production_plot(records: &[MetricRecord]) -> Plot {
    let mut plot = Plot::new();

    let (x, y): (Vec<String>, Vec<f64>) = records
        .iter()
        .filter_map(|r| r.timestamp.map(|ts| (format_timestamp(ts), r.device_pin_value)))
        .unzip();
    if !x.is_empty() {
        let trace = Scatter::new(x, y).mode(Mode::LinesMarkers).name("gas flow");
        plot.add_trace(trace);
    }

    let layout = Layout::new()
        .height(340)
        .margin(Margin::new().left(0).right(0).top(30).bottom(0))
        .x_axis(Axis::new().title("time").type_(AxisType::Date))
        .y_axis(Axis::new().title("m³"));
    plot.set_layout(layout);
    plot
}
