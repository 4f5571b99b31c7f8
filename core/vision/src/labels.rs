// dermasense/core/vision/src/labels.rs

/// Class names in the order of the classifier head's output units.
///
/// Index `i` of the logits is `CLASS_NAMES[i]`. This must match the label
/// order the checkpoint was fine-tuned with; reordering it mislabels every
/// prediction without any error.
pub const CLASS_NAMES: [&str; 23] = [
    "acne",
    "actinic_keratosis",
    "atopic_dermatitis",
    "basal_cell_carcinoma",
    "benign_keratosis",
    "cellulitis",
    "dermatofibroma",
    "eczema",
    "hemangioma",
    "herpes",
    "impetigo",
    "lentigo",
    "melanoma",
    "milia",
    "nevus",
    "onychomycosis",
    "psoriasis",
    "rosacea",
    "seborrheic_keratosis",
    "squamous_cell_carcinoma",
    "tinea",
    "urticaria",
    "vasculitis",
];

/// Positional mapping from output-class index to label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labels {
    names: &'static [&'static str],
}

impl Labels {
    pub const fn new(names: &'static [&'static str]) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'static str> {
        self.names.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &'static str)> + '_ {
        self.names.iter().copied().enumerate()
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::new(&CLASS_NAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_label_count() {
        assert_eq!(Labels::default().len(), 23);
    }

    #[test]
    fn test_label_order_is_pinned() {
        let labels = Labels::default();
        assert_eq!(labels.get(0), Some("acne"));
        assert_eq!(labels.get(3), Some("basal_cell_carcinoma"));
        assert_eq!(labels.get(12), Some("melanoma"));
        assert_eq!(labels.get(14), Some("nevus"));
        assert_eq!(labels.get(19), Some("squamous_cell_carcinoma"));
        assert_eq!(labels.get(22), Some("vasculitis"));
        assert_eq!(labels.get(23), None);
    }

    #[test]
    fn test_labels_are_unique_and_sorted() {
        let unique: HashSet<_> = CLASS_NAMES.iter().collect();
        assert_eq!(unique.len(), CLASS_NAMES.len());

        // Folder-per-class datasets assign indices alphabetically.
        let mut sorted = CLASS_NAMES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, CLASS_NAMES.to_vec());
    }

    #[test]
    fn test_iter_yields_indices() {
        let labels = Labels::default();
        let (idx, name) = labels.iter().nth(7).unwrap();
        assert_eq!(idx, 7);
        assert_eq!(name, "eczema");
    }
}
