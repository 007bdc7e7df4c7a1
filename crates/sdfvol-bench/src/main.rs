use std::path::PathBuf;
use std::process;

use sdfvol_bench::report;
use sdfvol_bench::runner::{self, GpuRunner};
use sdfvol_bench::scenes::{self, SceneConfig};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let mut scene_paths: Vec<PathBuf> = Vec::new();
    let mut output_path: Option<PathBuf> = None;
    let mut frames_override: Option<u32> = None;
    let mut use_gpu = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--scene" => {
                scene_paths.push(PathBuf::from(value_of(&args, &mut i, "--scene")));
            }
            "--output" => {
                output_path = Some(PathBuf::from(value_of(&args, &mut i, "--output")));
            }
            "--frames" => {
                let value = value_of(&args, &mut i, "--frames");
                match value.parse() {
                    Ok(n) => frames_override = Some(n),
                    Err(_) => {
                        eprintln!("invalid --frames value: {}", value);
                        process::exit(1);
                    }
                }
            }
            "--gpu" => use_gpu = true,
            "--help" | "-h" => {
                eprintln!("Usage: scene-runner [OPTIONS]");
                eprintln!("  --scene <path>    Run a RON scene file (repeatable; default: built-in scenes)");
                eprintln!("  --output <path>   Save results as a JSON report");
                eprintln!("  --frames <n>      Override the frame count of every scene");
                eprintln!("  --gpu             Render on a native GPU instead of the recording backend");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let mut scene_configs: Vec<SceneConfig> = if scene_paths.is_empty() {
        scenes::standard_scenes()
    } else {
        let mut loaded = Vec::new();
        for path in &scene_paths {
            match scenes::load_scene_file(path) {
                Ok(scene) => loaded.push(scene),
                Err(e) => {
                    eprintln!("{}: {}", path.display(), e);
                    process::exit(1);
                }
            }
        }
        loaded
    };
    if let Some(frames) = frames_override {
        for scene in &mut scene_configs {
            scene.frames = frames;
        }
    }

    let gpu = if use_gpu {
        log::info!("Initializing GPU...");
        match GpuRunner::new() {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                process::exit(1);
            }
        }
    } else {
        None
    };

    let mut results = Vec::new();
    for config in &scene_configs {
        let result = match &gpu {
            Some(gpu) => gpu.run_scene(config),
            None => runner::run_headless(config),
        };
        match result {
            Ok(result) => results.push(result),
            Err(e) => log::error!("Scene '{}' failed: {}", config.name, e),
        }
    }

    println!("\n## Light Volume Results\n");
    println!("{}", report::format_markdown(&results));
    println!("{}", report::format_slots(&results));

    if let Some(ref path) = output_path {
        let report = report::Report {
            timestamp: format!("scene-runner-{}", process::id()),
            results: results.clone(),
        };
        if let Err(e) = report::save_report(path, &report) {
            eprintln!("failed to save report: {}", e);
            process::exit(1);
        }
        log::info!("Saved report to {}", path.display());
    }

    if results.len() != scene_configs.len() {
        process::exit(1);
    }
    log::info!("Scene run complete.");
}

/// Consume the value following a flag.
fn value_of<'a>(args: &'a [String], i: &mut usize, flag: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(value) => value,
        None => {
            eprintln!("missing value for {}", flag);
            process::exit(1);
        }
    }
}
