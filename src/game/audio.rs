//! Optional audio capability injected into the engine

use std::sync::Arc;

/// Sound cues the engine emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEffect {
    Shoot,
    Hit,
    Explosion,
    LevelUp,
    GameOver,
}

impl SoundEffect {
    pub fn name(self) -> &'static str {
        match self {
            SoundEffect::Shoot => "shoot",
            SoundEffect::Hit => "hit",
            SoundEffect::Explosion => "explosion",
            SoundEffect::LevelUp => "levelUp",
            SoundEffect::GameOver => "gameOver",
        }
    }
}

/// Playback backend. Implementations must not block the frame loop.
pub trait AudioService: Send + Sync {
    fn play_sound(&self, effect: SoundEffect);
    fn play_music(&self);
}

/// Engine-side handle; absent audio is a silent no-op
#[derive(Clone, Default)]
pub struct Audio {
    service: Option<Arc<dyn AudioService>>,
}

impl Audio {
    pub fn new(service: Option<Arc<dyn AudioService>>) -> Self {
        Self { service }
    }

    pub fn play(&self, effect: SoundEffect) {
        if let Some(service) = &self.service {
            service.play_sound(effect);
        }
    }

    pub fn music(&self) {
        if let Some(service) = &self.service {
            service.play_music();
        }
    }
}

impl std::fmt::Debug for Audio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Audio")
            .field("enabled", &self.service.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl AudioService for Recorder {
        fn play_sound(&self, effect: SoundEffect) {
            self.0.lock().push(effect.name());
        }

        fn play_music(&self) {
            self.0.lock().push("music");
        }
    }

    #[test]
    fn missing_service_is_silent() {
        let audio = Audio::default();
        audio.play(SoundEffect::Shoot);
        audio.music();
    }

    #[test]
    fn forwards_to_service() {
        let recorder = Arc::new(Recorder::default());
        let audio = Audio::new(Some(recorder.clone()));
        audio.music();
        audio.play(SoundEffect::LevelUp);
        assert_eq!(*recorder.0.lock(), vec!["music", "levelUp"]);
    }
}
