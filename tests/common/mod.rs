// Not every integration test binary uses every helper here.
#![allow(dead_code)]

use ndarray::Array1;
use nwb_converter::{AcquisitionReader, NwbError, StimulusProtocol};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory acquisition reader with deterministic synthetic data.
///
/// Sample values encode their origin (`segment * 1000 + channel * 100 + i`)
/// so tests can verify that the right chunk ended up in the right record.
pub struct MockReader {
    pub name: String,
    pub n_segments: usize,
    pub samples_per_segment: usize,
    pub segment_spacing: f64,
    pub sampling_rate: f32,
    pub units: Vec<String>,
    pub gains: Vec<f32>,
    pub protocol: Option<StimulusProtocol>,
}

impl MockReader {
    /// A voltage-clamp-style source: responses in pA, one mV command trace
    /// per (segment, channel).
    pub fn with_protocol(n_segments: usize, n_channels: usize) -> Self {
        let traces = (0..n_segments)
            .map(|segment| {
                (0..n_channels)
                    .map(|channel| {
                        Array1::from_iter((0..8).map(|i| (segment * 10 + channel + i) as f32))
                    })
                    .collect()
            })
            .collect();
        let protocol = StimulusProtocol {
            traces,
            titles: vec!["step protocol".to_string()],
            units: vec!["mV".to_string(); n_channels],
        };
        MockReader {
            name: "mock.abf".to_string(),
            n_segments,
            samples_per_segment: 16,
            segment_spacing: 2.0,
            sampling_rate: 10_000.0,
            units: vec!["pA".to_string(); n_channels],
            gains: vec![2.0; n_channels],
            protocol: Some(protocol),
        }
    }

    /// A source whose format has no protocol section at all.
    pub fn without_protocol_section(n_segments: usize, n_channels: usize) -> Self {
        let mut reader = Self::with_protocol(n_segments, n_channels);
        reader.protocol = None;
        reader
    }

    /// A source with a protocol section that holds zero commands.
    pub fn with_empty_protocol(n_segments: usize, n_channels: usize) -> Self {
        let mut reader = Self::with_protocol(n_segments, n_channels);
        reader.protocol = Some(StimulusProtocol {
            traces: Vec::new(),
            titles: Vec::new(),
            units: vec!["mV".to_string(); n_channels],
        });
        reader
    }

    /// A source whose command count disagrees with its segment count.
    pub fn with_mismatched_protocol(n_segments: usize, n_channels: usize) -> Self {
        let mut reader = Self::with_protocol(n_segments + 1, n_channels);
        reader.n_segments = n_segments;
        reader
    }
}

impl AcquisitionReader for MockReader {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn segment_count(&self, _block: usize) -> Result<usize, NwbError> {
        Ok(self.n_segments)
    }

    fn signal_start_time(&self, _block: usize, segment: usize) -> Result<f64, NwbError> {
        Ok(segment as f64 * self.segment_spacing)
    }

    fn sampling_rate(&self) -> f32 {
        self.sampling_rate
    }

    fn channel_units(&self) -> &[String] {
        &self.units
    }

    fn channel_gains(&self) -> &[f32] {
        &self.gains
    }

    fn analog_signal_chunk(
        &self,
        _block: usize,
        segment: usize,
        channel: usize,
    ) -> Result<Array1<i32>, NwbError> {
        if segment >= self.n_segments || channel >= self.units.len() {
            return Err(NwbError::Reader(format!(
                "no chunk at segment {} channel {}",
                segment, channel
            )));
        }
        Ok(Array1::from_iter(
            (0..self.samples_per_segment).map(|i| (segment * 1000 + channel * 100 + i) as i32),
        ))
    }

    fn stimulus_protocol(&self) -> Result<Option<StimulusProtocol>, NwbError> {
        Ok(self.protocol.clone())
    }
}

static FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns a unique path in the system temp directory.
pub fn temp_nwb_path(tag: &str) -> PathBuf {
    let n = FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "nwb_converter_test_{}_{}_{}.nwb",
        std::process::id(),
        tag,
        n
    ))
}
