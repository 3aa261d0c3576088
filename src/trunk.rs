use std::fmt;

/// Backbone architectures the evaluator can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Trunk {
    #[value(name = "resnet50")]
    Resnet50,
    #[value(name = "resnet101")]
    Resnet101,
    #[value(name = "vgg16")]
    Vgg16,
}

/// Network family a trunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrunkFamily {
    ResNet,
    Vgg,
}

impl Trunk {
    /// The `(family, depth)` pair the network constructor expects.
    pub fn spec(self) -> (TrunkFamily, usize) {
        match self {
            Trunk::Resnet50 => (TrunkFamily::ResNet, 50),
            Trunk::Resnet101 => (TrunkFamily::ResNet, 101),
            Trunk::Vgg16 => (TrunkFamily::Vgg, 16),
        }
    }
}

impl fmt::Display for Trunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trunk::Resnet50 => "resnet50",
            Trunk::Resnet101 => "resnet101",
            Trunk::Vgg16 => "vgg16",
        };
        f.write_str(name)
    }
}
