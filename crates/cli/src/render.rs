use affectscope_core::emotion::EmotionVector;

const BAR_WIDTH: usize = 40;
#[cfg_attr(not(feature = "microphone"), allow(dead_code))]
const METER_WIDTH: usize = 50;

/// One line per label, bar length proportional to the share of the strongest label.
pub fn emotion_bars(scores: &EmotionVector) -> Vec<String> {
    scores
        .percent_of_max()
        .iter()
        .map(|&(label, pct)| {
            let filled = (pct as usize).min(100) * BAR_WIDTH / 100;
            format!(
                "{:<9}{}{} {:>3}%  ({:.2})",
                label.as_str(),
                "#".repeat(filled),
                " ".repeat(BAR_WIDTH - filled),
                pct,
                scores.get(label)
            )
        })
        .collect()
}

/// Meter fill in percent: 160x the energy, capped at 100.
#[cfg_attr(not(feature = "microphone"), allow(dead_code))]
pub fn meter_percent(energy: f32) -> usize {
    (energy * 160.0).round().clamp(0.0, 100.0) as usize
}

#[cfg_attr(not(feature = "microphone"), allow(dead_code))]
pub fn energy_meter(energy: f32) -> String {
    let filled = meter_percent(energy) * METER_WIDTH / 100;
    format!(
        "[{}{}] {:5.1}",
        "=".repeat(filled),
        " ".repeat(METER_WIDTH - filled),
        energy * 100.0
    )
}
