use serde::{Deserialize, Serialize};

/// Resume bookkeeping, persisted as state.json in the build folder.
#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct RunState {
    pub completed_frames: Vec<String>,
}

/// One successfully rejuvenated frame. Appended to the run's result list,
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RejuvenationResult {
    pub original_frame_name: String,
    pub output_frame_name: String,
    pub image_bytes: Vec<u8>,
    pub prompt_text: String,
}
