use ndarray::Array1;

use crate::types::NwbError;

/// Stimulus-protocol section of a source file: the command traces that were
/// applied while the responses were recorded.
///
/// Traces are segment-major: `traces[segment][channel]`. Units are reported
/// once per command channel.
#[derive(Debug, Clone)]
pub struct StimulusProtocol {
    /// Command traces, indexed by segment then channel
    pub traces: Vec<Vec<Array1<f32>>>,
    /// Protocol titles
    pub titles: Vec<String>,
    /// Unit string of each command channel
    pub units: Vec<String>,
}

impl StimulusProtocol {
    /// Number of stimulus commands (one per protocol segment).
    pub fn n_commands(&self) -> usize {
        self.traces.len()
    }
}

/// Read-side contract an acquisition reader must provide for conversion.
///
/// Implementations wrap a third-party format reader and are handed to the
/// conversion functions directly, so the adapter never resolves a reader
/// implementation by name at runtime.
pub trait AcquisitionReader {
    /// Name of the source (file name or equivalent), used in diagnostics
    /// and auto-generated metadata.
    fn source_name(&self) -> &str;

    /// Number of segments (sweeps/trials) in the given block.
    fn segment_count(&self, block: usize) -> Result<usize, NwbError>;

    /// Signal start time of one segment, in seconds from the start of the
    /// source file.
    fn signal_start_time(&self, block: usize, segment: usize) -> Result<f64, NwbError>;

    /// Sampling rate shared by all channels (Hz).
    fn sampling_rate(&self) -> f32;

    /// Unit string of each physical channel, in channel order.
    fn channel_units(&self) -> &[String];

    /// Amplifier gain of each physical channel, in channel order.
    fn channel_gains(&self) -> &[f32];

    /// Number of physical channels.
    fn channel_count(&self) -> usize {
        self.channel_units().len()
    }

    /// Raw samples of one channel within one segment.
    fn analog_signal_chunk(
        &self,
        block: usize,
        segment: usize,
        channel: usize,
    ) -> Result<Array1<i32>, NwbError>;

    /// The stimulus-protocol section, or `None` if the source format has no
    /// protocol section (e.g. pre-ABF2 files).
    fn stimulus_protocol(&self) -> Result<Option<StimulusProtocol>, NwbError>;
}
