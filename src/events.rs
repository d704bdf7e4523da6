use crate::types::LabeledEvents;

/// Converts a dense per-sample label sequence into sparse changepoint events.
///
/// Emits `(i, labels[i])` for every `i` in `1..labels.len()` where the label
/// differs from the previous sample. Index 0 is never reported: the first
/// sample is implicitly "no change". Empty or constant input yields empty
/// outputs.
///
/// # Examples
///
/// ```
/// use nwb_converter::dense_labels_to_events;
///
/// let (indices, values) = dense_labels_to_events(&[1, 1, 2, 2, 3]);
/// assert_eq!(indices, vec![2, 4]);
/// assert_eq!(values, vec![2, 3]);
/// ```
pub fn dense_labels_to_events(labels: &[i64]) -> (Vec<usize>, Vec<i64>) {
    let mut indices = Vec::new();
    let mut values = Vec::new();
    for i in 1..labels.len() {
        if labels[i] != labels[i - 1] {
            indices.push(i);
            values.push(labels[i]);
        }
    }
    (indices, values)
}

/// Builds a [`LabeledEvents`] record from a dense label sequence and the
/// per-sample timestamps it was sampled at.
///
/// Event timestamps are the timestamps at each changepoint index. The
/// display names cover every label value from 0 through the largest label
/// seen at a changepoint, so the record stays self-describing.
pub fn labeled_events_from_dense(
    name: &str,
    description: &str,
    labels: &[i64],
    timestamps: &[f64],
) -> LabeledEvents {
    let (indices, values) = dense_labels_to_events(labels);
    let event_timestamps = indices.iter().map(|&i| timestamps[i]).collect();
    let max_label = values.iter().copied().max().unwrap_or(-1);
    let label_names = (0..=max_label).map(|i| format!("Label {}", i)).collect();

    LabeledEvents {
        name: name.to_string(),
        description: description.to_string(),
        timestamps: event_timestamps,
        data: values,
        labels: label_names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_sequence_has_no_changepoints() {
        assert_eq!(dense_labels_to_events(&[5, 5, 5, 5]), (vec![], vec![]));
    }

    #[test]
    fn empty_and_singleton_sequences_are_empty() {
        assert_eq!(dense_labels_to_events(&[]), (vec![], vec![]));
        assert_eq!(dense_labels_to_events(&[7]), (vec![], vec![]));
    }

    #[test]
    fn changepoints_report_index_and_new_label() {
        let (indices, values) = dense_labels_to_events(&[1, 1, 2, 2, 3]);
        assert_eq!(indices, vec![2, 4]);
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn index_zero_is_never_a_changepoint() {
        let (indices, _) = dense_labels_to_events(&[9, 1, 1]);
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn output_is_strictly_increasing_and_counts_unequal_pairs() {
        let labels = [0i64, 0, 1, 1, 0, 2, 2, 2, 1, 1];
        let (indices, values) = dense_labels_to_events(&labels);

        let unequal_pairs = labels.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(indices.len(), unequal_pairs);
        assert_eq!(values.len(), unequal_pairs);
        assert!(indices.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn labeled_events_pick_timestamps_at_changepoints() {
        let labels = [0i64, 0, 1, 1, 2];
        let timestamps = [0.0, 0.1, 0.2, 0.3, 0.4];
        let events = labeled_events_from_dense("syllable", "onsets", &labels, &timestamps);

        assert_eq!(events.timestamps, vec![0.2, 0.4]);
        assert_eq!(events.data, vec![1, 2]);
        assert_eq!(events.labels.len(), 3);
        assert_eq!(events.labels[2], "Label 2");
    }
}
