use ndarray::Array1;
use nwb_converter::{
    read_container_file, write_reader_to_nwb, AcquisitionReader, ConversionMetadata, NwbError,
    RecordingOptions, StimulusProtocol,
};
use std::error::Error;

/// One-channel current-clamp source; each instance plays one session.
struct SessionSource {
    name: String,
    n_segments: usize,
    units: Vec<String>,
    gains: Vec<f32>,
}

impl SessionSource {
    fn new(name: &str, n_segments: usize) -> Self {
        SessionSource {
            name: name.to_string(),
            n_segments,
            units: vec!["mV".to_string()],
            gains: vec![1.0],
        }
    }
}

impl AcquisitionReader for SessionSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn segment_count(&self, _block: usize) -> Result<usize, NwbError> {
        Ok(self.n_segments)
    }

    fn signal_start_time(&self, _block: usize, segment: usize) -> Result<f64, NwbError> {
        Ok(segment as f64 * 1.5)
    }

    fn sampling_rate(&self) -> f32 {
        10_000.0
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
        _channel: usize,
    ) -> Result<Array1<i32>, NwbError> {
        Ok(Array1::from_iter((0..500).map(|i| (segment * 7 + i) as i32)))
    }

    fn stimulus_protocol(&self) -> Result<Option<StimulusProtocol>, NwbError> {
        let traces = (0..self.n_segments)
            .map(|segment| vec![Array1::from_elem(500, segment as f32 * -20.0)])
            .collect();
        Ok(Some(StimulusProtocol {
            traces,
            titles: vec!["current steps".to_string()],
            units: vec!["pA".to_string()],
        }))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Two source files recorded back to back; the second session started
    // 120 seconds after the first.
    let metadata = ConversionMetadata::from_json(
        r#"{
            "Icephys": {
                "Device": [{"name": "MultiClamp 700B"}],
                "Electrodes": [{"name": "cell-1", "device_name": "MultiClamp 700B"}],
                "Sessions": [
                    {"relative_session_start_time": 0.0, "stimulus_type": "hyperpolarizing steps"},
                    {"relative_session_start_time": 120.0, "stimulus_type": "depolarizing steps"}
                ]
            }
        }"#,
    )?;

    let mut options = RecordingOptions::default();
    options.experiment_type = "current_clamp".parse()?;

    let save_path = std::env::temp_dir().join("append_sessions_demo.nwb");
    let _ = std::fs::remove_file(&save_path);

    // Each write appends to the same container; row and group indices
    // continue where the previous session left off.
    for (name, n_segments) in [("session_a.abf", 4), ("session_b.abf", 2)] {
        let source = SessionSource::new(name, n_segments);
        write_reader_to_nwb(&source, &save_path, false, Some(&metadata), &options)?;
    }

    let container = read_container_file(&save_path)?;
    println!(
        "\n{} intracellular recordings across {} sequential recordings",
        container.intracellular_recordings.len(),
        container.sequential_recordings.len()
    );
    for (i, sequential) in container.sequential_recordings.iter().enumerate() {
        println!(
            "Session {}: {} segments, stimulus type '{}'",
            i,
            sequential.simultaneous_recordings.len(),
            sequential.stimulus_type
        );
    }

    std::fs::remove_file(&save_path)?;
    Ok(())
}
