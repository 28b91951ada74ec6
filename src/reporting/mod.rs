//! Chart payloads for the frontend

mod plots;

pub use plots::{
    Annotation, Axis, BarTrace, Figure, Layout, Line, Marker, MarkerColor, PlotBuilder, PlotStyle, Polar,
    PolarTrace, ScatterTrace, Trace, RADAR_METRICS,
};
