use crate::assets::{base_name, scene_line, scene_snippet, AssetLibrary};
use crate::config::Config;
use crate::gemini::GenerativeClient;
use crate::io::Storage;
use crate::resolver::Resolver;
use crate::script;
use crate::state::{RejuvenationResult, RunState};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;

pub struct RejuvenationWorkflow {
    config: Config,
    client: Box<dyn GenerativeClient>,
    storage: Arc<dyn Storage>,
    state: RunState,
    results: Vec<RejuvenationResult>,
}

impl RejuvenationWorkflow {
    pub async fn new(
        config: Config,
        client: Box<dyn GenerativeClient>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let state = Self::load_state(&config.build_folder, storage.as_ref()).await?;
        Ok(Self {
            config,
            client,
            storage,
            state,
            results: Vec::new(),
        })
    }

    async fn load_state(build_dir: &str, storage: &dyn Storage) -> Result<RunState> {
        let path = Path::new(build_dir).join("state.json");
        let path_str = path.to_str().unwrap();
        if storage.exists(path_str).await? {
            let bytes = storage.read(path_str).await?;
            let content = String::from_utf8(bytes)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(RunState::default())
        }
    }

    async fn save_state(&self) -> Result<()> {
        let path = Path::new(&self.config.build_folder).join("state.json");
        let content = serde_json::to_string_pretty(&self.state)?;
        self.storage
            .write(path.to_str().unwrap(), content.as_bytes())
            .await?;
        Ok(())
    }

    pub fn results(&self) -> &[RejuvenationResult] {
        &self.results
    }

    pub async fn run(&mut self) -> Result<()> {
        let library = AssetLibrary::load(self.storage.as_ref(), &self.config.input_folder)
            .await
            .context("Failed to load asset library")?;

        println!(
            "Loaded {} avatars, {} frames, {} text assets",
            library.avatars.len(),
            library.frames.len(),
            library.texts.len()
        );

        let (assembled_script, outcomes) = script::assemble(&library.frames, &library.texts);
        for outcome in &outcomes {
            if let script::LineOutcome::Skipped { frame, reason } = outcome {
                log::warn!("No script line for {}: {:?}", frame, reason);
            }
        }

        let script_path = Path::new(&self.config.build_folder).join("script.txt");
        self.storage
            .write(script_path.to_str().unwrap(), assembled_script.as_bytes())
            .await?;

        // Fatal precondition: nothing to work from, so no generation call
        // may be issued at all.
        if assembled_script.trim().is_empty() {
            anyhow::bail!(
                "Assembled script is empty; check the per-frame text assets. Aborting."
            );
        }

        let bible = self.load_or_build_bible(&library, &assembled_script).await?;

        let frame_names: Vec<String> = library.frames.keys().cloned().collect();
        let total_frames = frame_names.len();

        let pb = ProgressBar::new(total_frames as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );

        for (i, frame_name) in frame_names.iter().enumerate() {
            if self.state.completed_frames.contains(frame_name) {
                println!("Skipping completed frame: {}", frame_name);
                pb.inc(1);
                continue;
            }

            println!("Processing frame: {}", frame_name);
            match self
                .process_frame(&library, &assembled_script, &bible, frame_name)
                .await
            {
                Ok(Some(result)) => {
                    self.state.completed_frames.push(frame_name.clone());
                    self.save_state().await?;
                    self.results.push(result);
                }
                Ok(None) => {
                    log::warn!("Frame {} skipped", frame_name);
                }
                Err(e) => {
                    // A broken frame must never take down the run.
                    log::error!("Frame {} failed: {:#}", frame_name, e);
                }
            }
            pb.inc(1);

            if !self.config.unattended && i < total_frames - 1 {
                let ans = inquire::Confirm::new("Continue to next frame?")
                    .with_default(true)
                    .prompt();

                match ans {
                    Ok(true) => {}
                    Ok(false) => {
                        println!("Stopping as requested.");
                        break;
                    }
                    Err(_) => {
                        println!("Error reading input, stopping.");
                        break;
                    }
                }
            }
        }

        pb.finish_with_message("Run complete");
        println!(
            "All frames processed ({} rejuvenated this run).",
            self.results.len()
        );
        Ok(())
    }

    /// The bible is built exactly once per run, before any frame, and cached
    /// in the build folder so a resumed run reuses it.
    async fn load_or_build_bible(
        &self,
        library: &AssetLibrary,
        assembled_script: &str,
    ) -> Result<String> {
        let bible_path = Path::new(&self.config.build_folder).join("bible.txt");
        let bible_path_str = bible_path.to_str().unwrap();

        if self.storage.exists(bible_path_str).await? {
            println!("Loading cached character bible from {:?}", bible_path);
            let bytes = self.storage.read(bible_path_str).await?;
            return Ok(String::from_utf8(bytes)?);
        }

        println!("Building character bible...");
        let avatar_names: Vec<String> = library.avatars.keys().cloned().collect();
        let resolver = Resolver::new(self.client.as_ref());
        let bible = resolver.build_bible(&avatar_names, assembled_script).await;

        self.storage
            .write(bible_path_str, bible.as_bytes())
            .await?;
        Ok(bible)
    }

    /// Full resolution of a single frame: analyze, identify, localize,
    /// synthesize, generate, persist. Returns None for a non-fatal skip
    /// (missing text asset, generator returned no image).
    async fn process_frame(
        &self,
        library: &AssetLibrary,
        assembled_script: &str,
        bible: &str,
        frame_name: &str,
    ) -> Result<Option<RejuvenationResult>> {
        let frame = library
            .frames
            .get(frame_name)
            .context("Frame vanished from the library")?;

        let Some(text_asset) = library.find_frame_text(frame_name) else {
            log::warn!("No matching text asset for {}", frame_name);
            return Ok(None);
        };

        let scene_text = scene_line(&text_asset.content).unwrap_or("");
        let snippet = scene_snippet(&text_asset.content);

        let resolver = Resolver::new(self.client.as_ref());

        let analysis = resolver.analyze_frame(frame).await;
        let mapping = resolver
            .identify_character(scene_text, &analysis, bible)
            .await;

        // An avatar filename the model invented does not exist in the
        // library; that degrades to scene-only regeneration, never an error.
        let avatar = match &mapping.avatar_filename {
            Some(name) => {
                let found = library.avatars.get(name);
                if found.is_none() {
                    log::warn!(
                        "Identifier named unknown avatar '{}' for {}, regenerating scene-only",
                        name,
                        frame_name
                    );
                }
                found
            }
            None => None,
        };

        let context = script::localize(assembled_script, &snippet);
        let prompt = resolver
            .synthesize_prompt(
                scene_text,
                &mapping.character_name,
                &mapping.other_characters,
                bible,
                library.style_directive(),
                &analysis,
                &context,
                library.story_map(),
            )
            .await;

        let Some(image_bytes) = resolver
            .generate_image(&prompt, avatar, frame, &self.config.aspect_ratio)
            .await
        else {
            log::warn!("Generator returned no image for {}", frame_name);
            return Ok(None);
        };

        let base = base_name(frame_name);
        let output_frame_name = format!("{}_rejuvenated.png", base);
        let image_path = Path::new(&self.config.output_folder).join(&output_frame_name);
        self.storage
            .write(image_path.to_str().unwrap(), &image_bytes)
            .await?;

        let metadata = format!(
            "{}\nCHARACTER: {}\nPROMPT: {}\n\nSCENE DATA:\n{}",
            frame_name, mapping.character_name, prompt, text_asset.content
        );
        let metadata_path =
            Path::new(&self.config.output_folder).join(format!("{}_rejuvenated.txt", base));
        self.storage
            .write(metadata_path.to_str().unwrap(), metadata.as_bytes())
            .await?;

        println!("Frame complete: {}", output_frame_name);
        Ok(Some(RejuvenationResult {
            original_frame_name: frame_name.to_string(),
            output_frame_name,
            image_bytes,
            prompt_text: prompt,
        }))
    }
}
