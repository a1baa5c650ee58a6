use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;

// Sink for geometric traces emitted by the algorithms. The default sink
// drops everything; hosts install their own to visualise shove/walk steps.
pub trait DebugDecorator {
    fn add_point(&mut self, _p: Pt, _label: &str) {}
    fn add_polyline(&mut self, _l: &Polyline, _label: &str) {}
    fn message(&mut self, _msg: &str) {}
    fn begin_group(&mut self, _name: &str) {}
    fn end_group(&mut self) {}
}

#[derive(Debug, Default)]
pub struct NullDecorator;

impl DebugDecorator for NullDecorator {}

// Collects traces in memory; used by tests to assert on algorithm steps.
#[derive(Debug, Default)]
pub struct RecordingDecorator {
    pub messages: Vec<String>,
}

impl DebugDecorator for RecordingDecorator {
    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_owned());
    }
}
