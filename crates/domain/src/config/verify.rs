use serde::{Deserialize, Serialize};

/// Verify Gate  settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Max container width (px) the mobile check enforces.
    #[serde(default = "d_mobile_max_width_px")]
    pub mobile_max_width_px: u32,
    /// Minimum interactive touch-target height (px).
    #[serde(default = "d_mobile_min_touch_target_px")]
    pub mobile_min_touch_target_px: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mobile_max_width_px: d_mobile_max_width_px(),
            mobile_min_touch_target_px: d_mobile_min_touch_target_px(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_mobile_max_width_px() -> u32 {
    430
}
fn d_mobile_min_touch_target_px() -> u32 {
    44
}
