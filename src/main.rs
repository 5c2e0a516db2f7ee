use anyhow::{bail, Context, Result};
use clap::Parser;
use fs_err as fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use prompt_studio::apply::{apply_with_summary, AcceptMask};
use prompt_studio::cli::{self, Command, ConfigCommand, LineArtCommand, OptionsCommand, PresetCommand};
use prompt_studio::config::Config;
use prompt_studio::diff::diff;
use prompt_studio::document::{canonicalize, Document, FieldId};
use prompt_studio::editor::Editor;
use prompt_studio::errors::StudioError;
use prompt_studio::form::FormState;
use prompt_studio::session::Completion;
use prompt_studio::wire::{PromptMode, SettingsUpdate};
use prompt_studio::{provider, transcript, upload, ux};

fn read_document(path: &Path) -> Result<Document> {
    let text = if path.as_os_str() == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        fs::read_to_string(path)?
    };
    let doc: Document =
        serde_json::from_str(text.trim()).with_context(|| format!("{} is not valid JSON", path.display()))?;
    if !doc.is_object() {
        bail!("{} must contain a JSON object", path.display());
    }
    Ok(doc)
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(p) => {
            fs::write(p, text)?;
            println!("written to {}", p.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn pretty(doc: &Document) -> Result<String> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Mapper round trip, so applied results read exactly as the form would.
fn normalize(doc: &Document) -> Document {
    canonicalize(FormState::from_document(doc).to_document())
}

fn resolve_config(args: &cli::Args) -> Result<Config> {
    let mut cfg = Config::load(args.config.as_deref(), &args.root)?;
    if let Some(b) = args.backend {
        cfg.backend = b;
    }
    if let Some(p) = args.provider {
        cfg.provider = p;
    }
    if let Some(s) = &args.server {
        cfg.server_url = s.clone();
    }
    if let Some(m) = &args.model {
        cfg.model = Some(m.clone());
    }
    if let Some(t) = args.timeout_secs {
        cfg.timeout_secs = t;
    }
    if args.save_transcript {
        cfg.save_transcript = true;
    }
    Ok(cfg)
}

fn attach_images(paths: &[PathBuf], mut add: impl FnMut(String) -> Result<(), StudioError>) -> Result<()> {
    for p in paths {
        let uri = upload::load_image(p)?;
        if let Err(e) = add(uri) {
            // Over the cap: warn and keep going with what fits.
            ux::report(&e);
            break;
        }
    }
    Ok(())
}

/// Run the open dialog with a spinner and Ctrl-C cancellation. `None` means
/// the user cancelled.
async fn stream_dialog(editor: &mut Editor, cfg: &Config, debug: bool, instruction: &str) -> Result<Option<Completion>> {
    let canceller = editor.dialog_canceller().context("no dialog open")?;
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let pb = ux::stream_spinner("waiting for the model");
    let mut received = 0usize;
    let outcome = editor
        .run_dialog(instruction, |chunk| {
            received += chunk.chars().count();
            pb.set_message(format!("receiving ({received} chars)"));
        })
        .await;
    pb.finish_and_clear();
    watcher.abort();

    if cfg.save_transcript {
        if let Some(session) = editor.dialog() {
            if let Some(req) = session.last_request() {
                let entries = session.proposal().map(|p| p.entries.as_slice());
                let saved = transcript::save_exchange(Path::new(&cfg.root), Uuid::new_v4(), req, session.buffer(), entries)?;
                if debug {
                    transcript::print_saved_paths(&saved);
                }
            }
        }
    }

    match outcome {
        Ok(done) => {
            if let Some(w) = &done.warning {
                ux::report(w);
            }
            Ok(Some(done))
        }
        Err(StudioError::Cancelled) => {
            ux::report(&StudioError::Cancelled);
            if let Some(session) = editor.dialog() {
                if !session.buffer().is_empty() {
                    println!("{}", session.buffer());
                }
            }
            Ok(None)
        }
        Err(e) => Err(e).context("AI request failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &args.command {
        Command::Preview { input } => {
            let doc = read_document(input)?;
            println!("{}", FormState::from_document(&doc).render_output().text);
            return Ok(());
        }
        Command::Diff { old, new } => {
            let entries = diff(&read_document(old)?, &read_document(new)?);
            ux::print_diff_dashboard(&entries);
            return Ok(());
        }
        Command::Apply { base, proposed, accept, out } => {
            let base = read_document(base)?;
            let entries = diff(&base, &read_document(proposed)?);
            ux::print_diff_dashboard(&entries);
            let mask = match accept {
                Some(spec) => AcceptMask::parse(spec, entries.len())?,
                None => ux::prompt_mask(entries.len()),
            };
            let (applied, summary) = apply_with_summary(&base, &entries, &mask);
            ux::print_apply_dashboard(&summary);
            return write_output(out.as_deref(), &pretty(&normalize(&applied))?);
        }
        Command::Fields => {
            ux::print_fields();
            return Ok(());
        }
        _ => {}
    }

    let cfg = resolve_config(&args)?;
    log::debug!("backend={:?} provider={:?} server={}", cfg.backend, cfg.provider, cfg.server_url);
    let collab = provider::make_collaborators(&cfg)?;
    let mut editor = Editor::new(collab);

    match args.command {
        Command::Generate { description, ai } => {
            let instruction = description.unwrap_or_default();
            let session = editor.open_dialog(PromptMode::Generate);
            attach_images(&ai.images, |uri| session.images_mut().try_add(uri))?;
            let Some(done) = stream_dialog(&mut editor, &cfg, args.debug, &instruction).await? else {
                return Ok(());
            };
            if done.proposal.is_none() {
                println!("{}", done.text);
                return Ok(());
            }
            editor.apply_generated()?;
            write_output(ai.out.as_deref(), &pretty(&editor.document())?)?;
        }
        Command::Modify { input, request, ai, accept } => {
            editor.load_document(&read_document(&input)?);
            let session = editor.open_dialog(PromptMode::Modify);
            attach_images(&ai.images, |uri| session.images_mut().try_add(uri))?;
            let Some(done) = stream_dialog(&mut editor, &cfg, args.debug, &request).await? else {
                return Ok(());
            };
            let Some(proposal) = done.proposal else {
                println!("{}", done.text);
                return Ok(());
            };
            ux::print_diff_dashboard(&proposal.entries);
            if proposal.entries.is_empty() {
                return Ok(());
            }
            let mask = match accept {
                Some(spec) => AcceptMask::parse(&spec, proposal.entries.len())?,
                None => ux::prompt_mask(proposal.entries.len()),
            };
            let summary = editor.apply_proposal(&mask)?;
            ux::print_apply_dashboard(&summary);
            write_output(ai.out.as_deref(), &pretty(&editor.document())?)?;
        }
        Command::Presets(cmd) => match cmd {
            PresetCommand::List => {
                let presets = editor.list_presets().await?;
                if presets.is_empty() {
                    println!("(no presets)");
                }
                for p in presets {
                    println!("{}", p.name);
                }
            }
            PresetCommand::Show { name } => {
                if !editor.load_preset(&name).await? {
                    bail!("preset '{name}' not found");
                }
                println!("{}", pretty(&editor.document())?);
            }
            PresetCommand::Save { name, input } => {
                editor.load_document(&read_document(&input)?);
                editor.save_preset(&name).await?;
                println!("preset '{name}' saved");
            }
            PresetCommand::Format => {
                let report = editor.format_presets().await?;
                ux::print_format_report(&report);
            }
            PresetCommand::Delete { name } => {
                if ux::confirm(&format!("Delete preset '{name}'?")) {
                    editor.delete_preset(&name).await?;
                    println!("preset '{name}' deleted");
                } else {
                    println!("Aborted by user.");
                }
            }
        },
        Command::Suggest { field, query, limit } => {
            let Some(field_id) = FieldId::from_name(&field) else {
                bail!("unknown field '{field}' (run `prompt-studio fields` for the list)");
            };
            editor.refresh_suggestions().await?;
            ux::print_candidates(field_id, &editor.suggestions().suggest(field_id, &query, limit));
        }
        Command::Options(cmd) => match cmd {
            OptionsCommand::List => {
                editor.init().await;
                for (name, items) in editor.options() {
                    println!("{}: {}", name, items.join(", "));
                }
            }
            OptionsCommand::Show { name } => {
                for item in editor.field_options(&name).await? {
                    println!("{item}");
                }
            }
            OptionsCommand::Add { name, value } => {
                editor.add_option(&name, &value).await?;
                println!("added '{}' to {}", value.trim(), name.trim());
            }
        },
        Command::Image { input, images, aspect_ratio, size, thinking_level, out } => {
            editor.load_document(&read_document(&input)?);
            attach_images(&images, |uri| editor.attach_form_image(uri))?;
            let pb = ux::stream_spinner("generating image");
            let result = editor.submit_image(aspect_ratio, size, thinking_level).await;
            pb.finish_and_clear();
            let image = result?;
            let (mime, bytes) = upload::decode_data_uri(&image.data_uri)?;
            let path = out.unwrap_or_else(|| {
                let id = Uuid::new_v4().simple().to_string();
                PathBuf::from(format!("generated-{}.{}", &id[..8], upload::extension_for(&mime)))
            });
            fs::write(&path, &bytes)?;
            println!(
                "image saved to {} ({})",
                path.display(),
                humansize::format_size(bytes.len(), humansize::DECIMAL)
            );
        }
        Command::Config(cmd) => match cmd {
            ConfigCommand::Show => {
                let s = editor.settings().await?;
                println!("base_url:        {}", s.base_url);
                println!("model:           {}", s.model);
                println!("api key:         {}", if s.has_api_key { "set" } else { "not set" });
                println!("gemini_base_url: {}", s.gemini_base_url);
                println!("gemini_model:    {}", s.gemini_model);
                println!("gemini api key:  {}", if s.has_gemini_api_key { "set" } else { "not set" });
            }
            ConfigCommand::Set { base_url, api_key, model, gemini_base_url, gemini_api_key, gemini_model } => {
                let update = SettingsUpdate { base_url, api_key, model, gemini_base_url, gemini_api_key, gemini_model };
                if update == SettingsUpdate::default() {
                    bail!("nothing to update");
                }
                editor.update_settings(&update).await?;
                println!("settings saved");
            }
        },
        Command::LineArt(cmd) => match cmd {
            LineArtCommand::Show => {
                editor.enable_line_art().await?;
                println!("{}", editor.form().line_art.prompt);
            }
            LineArtCommand::Set { text } => {
                editor.set_line_art_prompt(text);
                editor.save_line_art_template().await?;
                println!("line-art template saved");
            }
        },
        Command::Preview { .. } | Command::Diff { .. } | Command::Apply { .. } | Command::Fields => {}
    }

    Ok(())
}
