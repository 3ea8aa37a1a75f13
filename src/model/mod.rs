//! Embedding backbones and the prototype-distance head
//!
//! The backbone factory turns a declarative [`BackboneConfig`] into one of
//! several interchangeable embedding networks with a single call contract:
//! a `[batch, c, h, w]` image tensor in, a `[batch, output_dim]` embedding
//! matrix out. Architecture dispatch happens once here, at construction;
//! the rest of the engine only sees the [`Backbone`] enum.

pub mod config;
pub mod conv4;
pub mod mlp;
pub mod proto;
pub mod resnet;
pub mod wrn;

pub use config::{Architecture, BackboneConfig, TrainingConfig};
pub use conv4::Conv4Net;
pub use mlp::MlpNet;
pub use proto::prototype_distance;
pub use resnet::Resnet18Net;
pub use wrn::WrnNet;

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};

use crate::utils::error::{FewShotError, Result};

/// An embedding network of any supported architecture.
///
/// Every variant maps `[batch, c, h, w]` images to `[batch, output_dim]`
/// feature vectors; which one is built is resolved once by
/// [`build_backbone`].
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    Conv4(Conv4Net<B>),
    Mlp(MlpNet<B>),
    WideResnet(WrnNet<B>),
    Resnet18(Resnet18Net<B>),
}

impl<B: Backend> Backbone<B> {
    /// Forward pass: `[batch, c, h, w]` -> `[batch, output_dim]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Backbone::Conv4(net) => net.forward(images),
            Backbone::Mlp(net) => net.forward(images),
            Backbone::WideResnet(net) => net.forward(images),
            Backbone::Resnet18(net) => net.forward(images),
        }
    }

    /// Architecture name for logs
    pub fn arch_name(&self) -> &'static str {
        match self {
            Backbone::Conv4(_) => "conv4",
            Backbone::Mlp(_) => "mlp",
            Backbone::WideResnet(_) => "wrn",
            Backbone::Resnet18(_) => "resnet18",
        }
    }
}

/// Build an embedding network from its declarative configuration.
///
/// Fails with [`FewShotError::Configuration`] on invalid parameters, on a
/// pretrained-weights option combined with a non-RGB channel count, or when
/// the pretrained record cannot be loaded. Pretrained record paths follow
/// burn's file-recorder convention (extension appended automatically).
pub fn build_backbone<B: Backend>(
    config: &BackboneConfig,
    device: &B::Device,
) -> Result<Backbone<B>> {
    config.validate()?;

    match &config.arch {
        Architecture::Conv4 { gap } => Ok(Backbone::Conv4(Conv4Net::new(
            config.in_channels,
            config.height,
            config.width,
            config.output_dim,
            *gap,
            device,
        ))),

        Architecture::Mlp { hidden_size, depth } => Ok(Backbone::Mlp(MlpNet::new(
            config.in_channels * config.height * config.width,
            config.output_dim,
            *hidden_size,
            *depth,
            device,
        ))),

        Architecture::WideResnet { depth, width } => Ok(Backbone::WideResnet(WrnNet::new(
            config.in_channels,
            *depth,
            *width,
            config.output_dim,
            device,
        ))),

        Architecture::Resnet18 { pretrained } => {
            if config.in_channels != 3 && pretrained.is_some() {
                return Err(FewShotError::Configuration(format!(
                    "pretrained resnet18 weights expect 3 input channels, got {}",
                    config.in_channels
                )));
            }

            let model = Resnet18Net::new(config.in_channels, config.output_dim, device);
            let model = match pretrained {
                Some(path) => model
                    .load_file(path.clone(), &CompactRecorder::new(), device)
                    .map_err(|e| {
                        FewShotError::Configuration(format!(
                            "failed to load pretrained weights from {:?}: {:?}",
                            path, e
                        ))
                    })?,
                None => model,
            };

            Ok(Backbone::Resnet18(model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    fn forward_shape(config: &BackboneConfig, batch: usize) -> [usize; 2] {
        let device = Default::default();
        let model = build_backbone::<B>(config, &device).unwrap();
        let input = Tensor::zeros([batch, config.in_channels, config.height, config.width], &device);
        model.forward(input).dims()
    }

    #[test]
    fn test_factory_builds_every_architecture() {
        let cases = [
            BackboneConfig::new(Architecture::Conv4 { gap: true }, 3, 32, 32, 64),
            BackboneConfig::new(Architecture::Conv4 { gap: false }, 1, 16, 16, 64),
            BackboneConfig::new(
                Architecture::Mlp {
                    hidden_size: 32,
                    depth: 2,
                },
                1,
                8,
                8,
                64,
            ),
            BackboneConfig::new(
                Architecture::WideResnet {
                    depth: 10,
                    width: 1,
                },
                3,
                16,
                16,
                64,
            ),
            BackboneConfig::new(Architecture::Resnet18 { pretrained: None }, 3, 32, 32, 64),
        ];

        for config in &cases {
            assert_eq!(forward_shape(config, 2), [2, 64], "arch {}", config.arch.name());
        }
    }

    #[test]
    fn test_factory_rejects_pretrained_with_non_rgb_input() {
        let device: <B as burn::tensor::backend::Backend>::Device = Default::default();
        let config = BackboneConfig::new(
            Architecture::Resnet18 {
                pretrained: Some("weights/resnet18".into()),
            },
            1,
            32,
            32,
            64,
        );

        let err = build_backbone::<B>(&config, &device).unwrap_err();
        assert!(matches!(err, FewShotError::Configuration(_)));
    }

    #[test]
    fn test_factory_rejects_invalid_wrn_depth() {
        let device: <B as burn::tensor::backend::Backend>::Device = Default::default();
        let config = BackboneConfig::new(
            Architecture::WideResnet {
                depth: 11,
                width: 1,
            },
            3,
            16,
            16,
            64,
        );

        let err = build_backbone::<B>(&config, &device).unwrap_err();
        assert!(matches!(err, FewShotError::Configuration(_)));
    }

    #[test]
    fn test_factory_loads_pretrained_record() {
        let device: <B as burn::tensor::backend::Backend>::Device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let weights = dir.path().join("resnet18");

        // Produce a record the way an external pretraining run would
        let donor = Resnet18Net::<B>::new(3, 64, &device);
        donor
            .clone()
            .save_file(weights.clone(), &CompactRecorder::new())
            .unwrap();

        let config = BackboneConfig::new(
            Architecture::Resnet18 {
                pretrained: Some(weights),
            },
            3,
            32,
            32,
            64,
        );
        let model = build_backbone::<B>(&config, &device).unwrap();
        assert_eq!(model.arch_name(), "resnet18");
    }

    #[test]
    fn test_factory_rejects_missing_pretrained_record() {
        let device: <B as burn::tensor::backend::Backend>::Device = Default::default();
        let config = BackboneConfig::new(
            Architecture::Resnet18 {
                pretrained: Some("does/not/exist".into()),
            },
            3,
            32,
            32,
            64,
        );

        assert!(build_backbone::<B>(&config, &device).is_err());
    }
}
