//! Model and training configuration
//!
//! Declarative configuration for the backbone factory and the run-scoped
//! training hyperparameters. Everything here is plain serde data: a config
//! is parsed once, validated once, and then handed to the factory or the
//! trainer at construction. Nothing mutates it afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{FewShotError, Result};

/// Supported backbone architectures with their per-architecture options.
///
/// The tag is the architecture name; an unknown name fails when the
/// configuration is deserialized, before any model is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Architecture {
    /// Four-stage convolutional embedder with an input-size-driven stride
    /// schedule. `gap` selects global average pooling before the output
    /// projection; without it the flattened feature volume feeds the
    /// projection and the backbone is only valid for one input resolution.
    Conv4 { gap: bool },

    /// Fully-connected embedder over the flattened input. `depth` hidden
    /// layers of `hidden_size` units; depth 0 projects the input directly.
    Mlp { hidden_size: usize, depth: usize },

    /// CIFAR-style Wide ResNet. `depth` must be of the form `6n + 4`.
    #[serde(rename = "wrn")]
    WideResnet { depth: usize, width: usize },

    /// 18-layer residual network. `pretrained` optionally names a weight
    /// record produced externally; combining it with a non-RGB channel
    /// count is a configuration error.
    Resnet18 {
        #[serde(default)]
        pretrained: Option<PathBuf>,
    },
}

impl Architecture {
    /// Short name used in logs and CLI output
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Conv4 { .. } => "conv4",
            Architecture::Mlp { .. } => "mlp",
            Architecture::WideResnet { .. } => "wrn",
            Architecture::Resnet18 { .. } => "resnet18",
        }
    }
}

/// Declarative description of the embedding network to build
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackboneConfig {
    /// Architecture name plus its option bag
    pub arch: Architecture,
    /// Input channel count
    pub in_channels: usize,
    /// Input height
    pub height: usize,
    /// Input width
    pub width: usize,
    /// Width of the produced embedding (or logit) vectors
    pub output_dim: usize,
}

impl BackboneConfig {
    pub fn new(arch: Architecture, in_channels: usize, height: usize, width: usize, output_dim: usize) -> Self {
        Self {
            arch,
            in_channels,
            height,
            width,
            output_dim,
        }
    }

    /// Validate dimensions and architecture parameters
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.height == 0 || self.width == 0 {
            return Err(FewShotError::Configuration(format!(
                "input dimensions must be positive, got {}x{}x{}",
                self.in_channels, self.height, self.width
            )));
        }
        if self.output_dim == 0 {
            return Err(FewShotError::Configuration(
                "output_dim must be positive".to_string(),
            ));
        }

        match &self.arch {
            Architecture::WideResnet { depth, width } => {
                if *depth < 10 || (*depth - 4) % 6 != 0 {
                    return Err(FewShotError::Configuration(format!(
                        "wrn depth must be 6n + 4 with n >= 1, got {}",
                        depth
                    )));
                }
                if *width == 0 {
                    return Err(FewShotError::Configuration(
                        "wrn width must be positive".to_string(),
                    ));
                }
            }
            Architecture::Mlp { hidden_size, depth } => {
                if *depth > 0 && *hidden_size == 0 {
                    return Err(FewShotError::Configuration(
                        "mlp hidden_size must be positive when depth > 0".to_string(),
                    ));
                }
            }
            Architecture::Conv4 { .. } | Architecture::Resnet18 { .. } => {}
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Run-scoped training configuration.
///
/// Handed to the trainer at construction and never mutated afterwards; the
/// mutable counterparts (current learning rate, plateau counters) live in
/// the scheduler state and are checkpointed with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of epochs to train
    pub epochs: usize,
    /// Initial learning rate
    pub learning_rate: f64,
    /// Weight decay (L2 regularization)
    pub weight_decay: f64,
    /// Multiplicative learning-rate reduction on plateau
    pub plateau_factor: f64,
    /// Epochs without validation-loss improvement before reducing the rate
    pub patience: usize,
    /// Lower bound for the learning rate
    pub min_lr: f64,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Directory for per-epoch checkpoints
    pub checkpoint_dir: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            learning_rate: 1e-3,
            weight_decay: 5e-4,
            plateau_factor: 0.1,
            patience: 10,
            min_lr: 1e-6,
            seed: 42,
            checkpoint_dir: "output/checkpoints".to_string(),
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(FewShotError::Configuration(
                "epochs must be greater than 0".to_string(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(FewShotError::Configuration(
                "learning_rate must be positive".to_string(),
            ));
        }
        if !(self.plateau_factor > 0.0 && self.plateau_factor < 1.0) {
            return Err(FewShotError::Configuration(
                "plateau_factor must be in (0, 1)".to_string(),
            ));
        }
        if self.min_lr < 0.0 || self.min_lr > self.learning_rate {
            return Err(FewShotError::Configuration(
                "min_lr must be in [0, learning_rate]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_names_round_trip() {
        let configs = [
            Architecture::Conv4 { gap: true },
            Architecture::Mlp {
                hidden_size: 256,
                depth: 2,
            },
            Architecture::WideResnet {
                depth: 28,
                width: 10,
            },
            Architecture::Resnet18 { pretrained: None },
        ];

        for arch in configs {
            let json = serde_json::to_string(&arch).unwrap();
            let back: Architecture = serde_json::from_str(&json).unwrap();
            assert_eq!(back, arch);
        }
    }

    #[test]
    fn test_unknown_architecture_name_is_rejected() {
        let json = r#"{ "name": "vit", "patch_size": 16 }"#;
        assert!(serde_json::from_str::<Architecture>(json).is_err());
    }

    #[test]
    fn test_wrn_tag_is_wrn() {
        let json = serde_json::to_string(&Architecture::WideResnet {
            depth: 16,
            width: 2,
        })
        .unwrap();
        assert!(json.contains("\"wrn\""));
    }

    #[test]
    fn test_backbone_config_validation() {
        let mut config = BackboneConfig::new(Architecture::Conv4 { gap: true }, 3, 84, 84, 64);
        assert!(config.validate().is_ok());

        config.in_channels = 0;
        assert!(config.validate().is_err());

        let bad_wrn = BackboneConfig::new(
            Architecture::WideResnet {
                depth: 27,
                width: 10,
            },
            3,
            32,
            32,
            64,
        );
        assert!(bad_wrn.validate().is_err());
    }

    #[test]
    fn test_backbone_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone.json");

        let config = BackboneConfig::new(
            Architecture::Mlp {
                hidden_size: 128,
                depth: 2,
            },
            1,
            28,
            28,
            32,
        );
        config.save(&path).unwrap();

        assert_eq!(BackboneConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_training_config_validation() {
        assert!(TrainingConfig::default().validate().is_ok());

        let mut config = TrainingConfig::default();
        config.plateau_factor = 1.5;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.min_lr = 1.0;
        assert!(config.validate().is_err());
    }
}
