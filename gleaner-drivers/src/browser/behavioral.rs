use crate::error::DriverError;
use fantoccini::elements::Element;
use rand::rngs::OsRng;
use rand::Rng;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::sleep;

/// Human-like pauses and typing, so scripted input looks less mechanical.
#[derive(Debug, Clone)]
pub struct BehavioralEngine {
    navigation_pause_ms: RangeInclusive<u64>,
    keystroke_pause_ms: RangeInclusive<u64>,
    lazy_content_pause_ms: RangeInclusive<u64>,
}

impl Default for BehavioralEngine {
    fn default() -> Self {
        Self {
            navigation_pause_ms: 300..=1200,
            keystroke_pause_ms: 30..=150,
            lazy_content_pause_ms: 1500..=2500,
        }
    }
}

impl BehavioralEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pause_before_navigation(&self) {
        random_delay(&self.navigation_pause_ms).await;
    }

    pub async fn pause_for_lazy_content(&self) {
        random_delay(&self.lazy_content_pause_ms).await;
    }

    /// Send `text` one character at a time with a short random gap after each.
    pub async fn type_text_human_like(
        &self,
        element: &Element,
        text: &str,
    ) -> Result<(), DriverError> {
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element.send_keys(ch.encode_utf8(&mut buf)).await?;
            random_delay(&self.keystroke_pause_ms).await;
        }
        Ok(())
    }
}

async fn random_delay(range: &RangeInclusive<u64>) {
    let ms = OsRng.gen_range(range.clone());
    if ms > 0 {
        sleep(Duration::from_millis(ms)).await;
    }
}
