use crate::assets::ImageAsset;
use crate::gemini::{GenerativeClient, ModelTier, Part};
use serde::Deserialize;

/// Context budgets for embedding large texts into prompts. Hard caps; the
/// bible budget tightens as the pipeline narrows: identification still
/// cross-references dialogue notes, synthesis only needs identity traits.
pub const SCRIPT_EXCERPT_CAP: usize = 15_000;
pub const BIBLE_IDENTIFY_CAP: usize = 8_000;
pub const BIBLE_SYNTHESIS_CAP: usize = 1_000;

/// Sentinel values substituted when a generative call fails. Downstream
/// stages consume these as opaque text, so a degraded call weakens output
/// quality instead of aborting the run.
pub const BIBLE_FALLBACK: &str = "Character bible unavailable for this run.";
pub const ANALYSIS_FALLBACK: &str = "No visual analysis available for this frame.";
pub const PROMPT_FALLBACK: &str =
    "Rejuvenate this film frame as a premium cinematic still: preserve the original \
     composition, pose and lighting, restore natural skin texture and color grade, \
     35mm lens character, subtle film grain.";

pub const UNKNOWN_CHARACTER: &str = "Unknown";

/// Per-frame identification result. Derived fresh for every frame, never
/// cached across frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterMapping {
    pub character_name: String,
    pub avatar_filename: Option<String>,
    pub other_characters: Vec<String>,
}

impl CharacterMapping {
    pub fn unknown() -> Self {
        Self {
            character_name: UNKNOWN_CHARACTER.to_string(),
            avatar_filename: None,
            other_characters: Vec::new(),
        }
    }
}

pub fn truncate_chars(s: &str, cap: usize) -> String {
    s.chars().take(cap).collect()
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        s.to_string()
    }
}

/// The staged per-run / per-frame AI pipeline. Borrows the client so the
/// workflow keeps ownership; every stage is a single generative call with a
/// local failure policy.
pub struct Resolver<'a> {
    client: &'a dyn GenerativeClient,
}

impl<'a> Resolver<'a> {
    pub fn new(client: &'a dyn GenerativeClient) -> Self {
        Self { client }
    }

    /// One large-context call per run. The result is shared read-only by all
    /// frame resolutions; a failure degrades to the sentinel bible.
    pub async fn build_bible(&self, avatar_names: &[String], script: &str) -> String {
        let prompt = format!(
            "You are a film production continuity assistant building a CHARACTER BIBLE \
             for a frame rejuvenation pass.\
             \n\nAvatar reference images available (by filename):\n{}\
             \n\nFull narrative script (one scene line per frame, in frame order):\n{}\
             \n\nProduce the character bible as plain text. For every character that \
             speaks or is described in the script:\
             \n- physical descriptors (age range, build, hair, distinguishing features)\
             \n- dialogue patterns and recurring emotional register\
             \n- which avatar filename most plausibly depicts them, if any\
             \nKeep it factual and grounded in the script. Do not invent characters.",
            avatar_names.join("\n"),
            truncate_chars(script, SCRIPT_EXCERPT_CAP),
        );

        match self
            .client
            .generate(ModelTier::Pro, &[Part::text(prompt)])
            .await
        {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Bible generation failed, continuing degraded: {}", e);
                BIBLE_FALLBACK.to_string()
            }
        }
    }

    /// One fast-tier call per frame describing what the camera sees.
    pub async fn analyze_frame(&self, frame: &ImageAsset) -> String {
        let parts = vec![
            Part::text(
                "Analyze this film frame for a cinematography report. Describe, in \
                 compact prose: the lighting setup (key/fill/practicals, color \
                 temperature), apparent lens characteristics (focal length feel, depth \
                 of field, distortion), the subject's pose and silhouette, the \
                 environment, and the subject's inferred emotional state.",
            ),
            Part::Image {
                media_type: frame.media_type.clone(),
                bytes: frame.bytes.clone(),
            },
        ];

        match self.client.generate(ModelTier::Flash, &parts).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!(
                    "Visual analysis failed for {}, continuing degraded: {}",
                    frame.name,
                    e
                );
                ANALYSIS_FALLBACK.to_string()
            }
        }
    }

    /// Cross-references scene text, visual analysis and the bible to decide
    /// who is in the frame. Structured output; any parse trouble falls back
    /// to the unknown mapping.
    pub async fn identify_character(
        &self,
        scene_text: &str,
        analysis: &str,
        bible: &str,
    ) -> CharacterMapping {
        let prompt = format!(
            "Identify the character depicted in a film frame by cross-referencing \
             three sources.\
             \n\nSCENE TEXT (dialogue/action for this frame):\n{}\
             \n\nVISUAL ANALYSIS of the frame:\n{}\
             \n\nCHARACTER BIBLE:\n{}\
             \n\nReturn the primary on-screen character's name, the avatar image \
             filename associated with them in the bible (empty if none), any other \
             characters present in the scene, and a one-sentence reasoning.",
            scene_text,
            analysis,
            truncate_chars(bible, BIBLE_IDENTIFY_CAP),
        );

        let schema = serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "characterName": { "type": "STRING" },
                "avatarFilename": { "type": "STRING" },
                "otherCharacters": { "type": "ARRAY", "items": { "type": "STRING" } },
                "reasoning": { "type": "STRING" }
            },
            "required": ["characterName"]
        });

        let raw = match self
            .client
            .generate_json(ModelTier::Flash, &[Part::text(prompt)], schema)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Character identification call failed: {}", e);
                return CharacterMapping::unknown();
            }
        };

        #[derive(Deserialize)]
        struct IdentifyResponse {
            #[serde(rename = "characterName")]
            character_name: Option<String>,
            #[serde(rename = "avatarFilename")]
            avatar_filename: Option<String>,
            #[serde(rename = "otherCharacters", default)]
            other_characters: Vec<String>,
            // `reasoning` is requested for model quality but discarded here.
        }

        let clean = strip_code_blocks(&raw);
        match serde_json::from_str::<IdentifyResponse>(&clean) {
            Ok(parsed) => CharacterMapping {
                character_name: parsed
                    .character_name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_CHARACTER.to_string()),
                avatar_filename: parsed.avatar_filename.filter(|f| !f.trim().is_empty()),
                other_characters: parsed.other_characters,
            },
            Err(e) => {
                log::warn!("Unparseable identification response ({}): {}", e, clean);
                CharacterMapping::unknown()
            }
        }
    }

    /// Combines every contextual signal into the final generation
    /// instruction for the image model.
    #[allow(clippy::too_many_arguments)]
    pub async fn synthesize_prompt(
        &self,
        scene_text: &str,
        character_name: &str,
        other_characters: &[String],
        bible: &str,
        style: &str,
        analysis: &str,
        context: &str,
        story_map: Option<&str>,
    ) -> String {
        let others = if other_characters.is_empty() {
            "none".to_string()
        } else {
            other_characters.join(", ")
        };
        let story_section = match story_map {
            Some(map) => format!("\n\nSTORY MAP:\n{}", map),
            None => String::new(),
        };

        let prompt = format!(
            "Write a single image-generation prompt for rejuvenating a film frame.\
             \n\nPRIMARY CHARACTER: {}\
             \nOTHER CHARACTERS IN SCENE: {}\
             \n\nSCENE TEXT:\n{}\
             \n\nSURROUNDING SCRIPT CONTEXT:\n{}\
             \n\nVISUAL ANALYSIS of the original frame:\n{}\
             \n\nCHARACTER IDENTITY TRAITS (from bible):\n{}\
             \n\nSTYLE DIRECTIVE: {}{}\
             \n\nThe prompt you write must: infer the precise micro-expression the \
             scene calls for; instruct the generator to replace the subject's facial \
             identity and skin texture with the reference avatar while keeping the \
             original pose, framing and lighting; specify lens and cinematographic \
             treatment consistent with the analysis; and match the emotional tone of \
             the script action. Return only the prompt text.",
            character_name,
            others,
            scene_text,
            context,
            analysis,
            truncate_chars(bible, BIBLE_SYNTHESIS_CAP),
            style,
            story_section,
        );

        match self
            .client
            .generate(ModelTier::Flash, &[Part::text(prompt)])
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                log::warn!("Prompt synthesis failed, using fallback prompt: {}", e);
                PROMPT_FALLBACK.to_string()
            }
        }
    }

    /// Requests the replacement frame. With an avatar the payload order is
    /// fixed: prompt, transplant instruction, avatar label, avatar image,
    /// scene label, scene image. Instructions must precede the images they
    /// govern. All failures collapse to None; the caller marks the frame
    /// failed without retrying.
    pub async fn generate_image(
        &self,
        prompt: &str,
        avatar: Option<&ImageAsset>,
        scene: &ImageAsset,
        aspect_ratio: &str,
    ) -> Option<Vec<u8>> {
        let parts = match avatar {
            Some(avatar) => vec![
                Part::text(prompt),
                Part::text(
                    "IDENTITY TRANSPLANT: the avatar image below is the sole source of \
                     the subject's facial identity and skin texture. The scene frame \
                     below supplies the pose, lighting and composition, which must be \
                     preserved exactly. Composite the avatar's identity onto the scene.",
                ),
                Part::text("AVATAR REFERENCE (identity source):"),
                Part::Image {
                    media_type: avatar.media_type.clone(),
                    bytes: avatar.bytes.clone(),
                },
                Part::text("SCENE FRAME (composition source):"),
                Part::Image {
                    media_type: scene.media_type.clone(),
                    bytes: scene.bytes.clone(),
                },
            ],
            None => vec![
                Part::text(prompt),
                Part::text(
                    "Re-render this frame as a premium cinematic still. Keep the \
                     subject, pose, composition and lighting; restore texture, grain \
                     and color grade.",
                ),
                Part::Image {
                    media_type: scene.media_type.clone(),
                    bytes: scene.bytes.clone(),
                },
            ],
        };

        match self.client.generate_image(&parts, aspect_ratio).await {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Image generation failed for {}: {}", scene.name, e);
                None
            }
        }
    }
}
