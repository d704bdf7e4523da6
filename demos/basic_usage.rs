use ndarray::Array1;
use nwb_converter::{
    read_container_file, write_reader_to_nwb, AcquisitionReader, ConversionMetadata, NwbError,
    RecordingOptions, StimulusProtocol, TraceData,
};
use std::error::Error;

/// Synthetic two-channel voltage-clamp source standing in for a real
/// format reader (e.g. an ABF reader wrapped in `AcquisitionReader`).
struct SyntheticSource {
    units: Vec<String>,
    gains: Vec<f32>,
}

impl SyntheticSource {
    fn new() -> Self {
        SyntheticSource {
            units: vec!["pA".to_string(), "pA".to_string()],
            gains: vec![1.0, 1.0],
        }
    }
}

impl AcquisitionReader for SyntheticSource {
    fn source_name(&self) -> &str {
        "synthetic.abf"
    }

    fn segment_count(&self, _block: usize) -> Result<usize, NwbError> {
        Ok(3)
    }

    fn signal_start_time(&self, _block: usize, segment: usize) -> Result<f64, NwbError> {
        Ok(segment as f64 * 5.0)
    }

    fn sampling_rate(&self) -> f32 {
        20_000.0
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
        Ok(Array1::from_iter(
            (0..1000).map(|i| ((segment + channel) * 50 + i % 64) as i32),
        ))
    }

    fn stimulus_protocol(&self) -> Result<Option<StimulusProtocol>, NwbError> {
        let traces = (0..3)
            .map(|segment| {
                (0..2)
                    .map(|_| Array1::from_elem(1000, (segment as f32 + 1.0) * 10.0))
                    .collect()
            })
            .collect();
        Ok(Some(StimulusProtocol {
            traces,
            titles: vec!["voltage steps".to_string()],
            units: vec!["mV".to_string(), "mV".to_string()],
        }))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let source = SyntheticSource::new();

    let metadata = ConversionMetadata::from_json(
        r#"{
            "NWBFile": {
                "session_description": "Synthetic voltage-clamp demo",
                "identifier": "demo-001"
            },
            "Icephys": {
                "Device": [{"name": "Axopatch 200B", "description": "patch amplifier"}],
                "Sessions": [
                    {"relative_session_start_time": 0.0, "stimulus_type": "voltage steps"}
                ]
            }
        }"#,
    )?;

    // Convert the source into a container snapshot
    let save_path = std::env::temp_dir().join("basic_usage_demo.nwb");
    let diagnostics = write_reader_to_nwb(
        &source,
        &save_path,
        true,
        Some(&metadata),
        &RecordingOptions::default(),
    )?;

    for diagnostic in diagnostics.items() {
        println!("warning: {}", diagnostic.message);
    }

    // Read the snapshot back and print a summary
    let container = read_container_file(&save_path)?;

    println!("\nSession: {}", container.session_description);
    println!("Identifier: {}", container.identifier);
    println!("Number of devices: {}", container.devices.len());
    println!("Number of electrodes: {}", container.icephys_electrodes.len());
    println!(
        "Number of intracellular recordings: {}",
        container.intracellular_recordings.len()
    );
    println!(
        "Number of simultaneous recordings: {}",
        container.simultaneous_recordings.len()
    );
    println!(
        "Number of sequential recordings: {}",
        container.sequential_recordings.len()
    );

    // Show the first recording row
    if let Some(row) = container.intracellular_recordings.first() {
        println!("\nFirst recording:");
        println!("  Electrode: {}", row.electrode);
        println!("  Response: {} ({})", row.response.name, row.response.unit());
        println!("  Starting time: {:.3} s", row.response.starting_time);
        println!("  Rate: {} Hz", row.response.rate);
        println!("  Conversion: {:e}", row.response.conversion);
        if let TraceData::RawI32(data) = &row.response.data {
            let n = std::cmp::min(5, data.len());
            println!("  First {} samples: {:?}", n, &data.as_slice().unwrap()[..n]);
        }
        if let Some(stimulus) = &row.stimulus {
            println!("  Stimulus: {} ({})", stimulus.name, stimulus.unit());
        }
    }

    std::fs::remove_file(&save_path)?;
    Ok(())
}
