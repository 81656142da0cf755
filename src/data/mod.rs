/// Data layer: pickle decoding, numpy reconstruction, and the dataset model.
///
/// Architecture:
/// ```text
///  mnist.pkl.gz / mnist.pkl
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  open + gunzip, hand bytes to the pickle VM
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐     ┌──────────┐
///   │  pickle   │ ──▶ │  numpy    │  _reconstruct / dtype → NdArray
///   └──────────┘     └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ MnistDataset  │  (training, validation, test) splits
///   └──────────────┘
/// ```

pub mod loader;
pub mod model;
pub mod numpy;
pub mod pickle;
