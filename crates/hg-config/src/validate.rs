use crate::hourglass::HourglassConfig;
use crate::stage::StageConfig;

/// Internal validation, called automatically during `HourglassConfig::from_str` / `load`.
pub(crate) fn validate(config: &HourglassConfig) -> anyhow::Result<()> {
    if config.runtime.lanes == 0 {
        anyhow::bail!("runtime.lanes must be > 0");
    }
    if config.runtime.channel_capacity == 0 {
        anyhow::bail!("runtime.channel_capacity must be > 0");
    }

    for stage in &config.stages {
        validate_stage(stage)?;
    }

    Ok(())
}

/// Window shape checks: `length > 0`, `0 < slide <= length`.
pub(crate) fn validate_stage(stage: &StageConfig) -> anyhow::Result<()> {
    if stage.length.is_zero() {
        anyhow::bail!("stage {:?}: length must be > 0", stage.name);
    }
    if let Some(slide) = stage.slide {
        if slide.is_zero() {
            anyhow::bail!("stage {:?}: slide must be > 0", stage.name);
        }
        if slide > stage.length {
            anyhow::bail!(
                "stage {:?}: slide ({}) exceeds length ({})",
                stage.name,
                slide,
                stage.length,
            );
        }
    }
    Ok(())
}
