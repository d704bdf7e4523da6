use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array1;
use nwb_converter::{
    add_all, dense_labels_to_events, AcquisitionReader, ConversionMetadata, Diagnostics,
    NwbContainer, NwbError, RecordingOptions, StimulusProtocol,
};

struct BenchReader {
    n_segments: usize,
    samples: usize,
    units: Vec<String>,
    gains: Vec<f32>,
}

impl BenchReader {
    fn new(n_segments: usize, n_channels: usize, samples: usize) -> Self {
        BenchReader {
            n_segments,
            samples,
            units: vec!["pA".to_string(); n_channels],
            gains: vec![1.0; n_channels],
        }
    }
}

impl AcquisitionReader for BenchReader {
    fn source_name(&self) -> &str {
        "bench.abf"
    }

    fn segment_count(&self, _block: usize) -> Result<usize, NwbError> {
        Ok(self.n_segments)
    }

    fn signal_start_time(&self, _block: usize, segment: usize) -> Result<f64, NwbError> {
        Ok(segment as f64)
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
            (0..self.samples).map(|i| (segment + channel + i) as i32),
        ))
    }

    fn stimulus_protocol(&self) -> Result<Option<StimulusProtocol>, NwbError> {
        let traces = (0..self.n_segments)
            .map(|_| {
                (0..self.units.len())
                    .map(|_| Array1::zeros(self.samples))
                    .collect()
            })
            .collect();
        Ok(Some(StimulusProtocol {
            traces,
            titles: Vec::new(),
            units: vec!["mV".to_string(); self.units.len()],
        }))
    }
}

pub fn bench_assemble_recordings(c: &mut Criterion) {
    let reader = BenchReader::new(32, 4, 2048);
    let metadata = ConversionMetadata::default();
    let options = RecordingOptions::default();

    c.bench_function("assemble_icephys_recordings", |b| {
        b.iter(|| {
            let mut container = NwbContainer::new("bench", "bench-id");
            let mut diagnostics = Diagnostics::new();
            add_all(
                black_box(&reader),
                &mut container,
                &metadata,
                &options,
                &mut diagnostics,
            )
            .unwrap();
            black_box(container.intracellular_recordings.len())
        });
    });
}

pub fn bench_changepoint_extraction(c: &mut Criterion) {
    let labels: Vec<i64> = (0..100_000).map(|i| (i / 37) % 12).collect();

    c.bench_function("dense_labels_to_events", |b| {
        b.iter(|| {
            let (indices, values) = dense_labels_to_events(black_box(&labels));
            black_box((indices.len(), values.len()))
        });
    });
}

criterion_group!(
    benches,
    bench_assemble_recordings,
    bench_changepoint_extraction
);
criterion_main!(benches);
