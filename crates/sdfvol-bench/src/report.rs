use std::path::Path;

use crate::runner::SceneResult;

/// Results from one scene-runner invocation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub results: Vec<SceneResult>,
}

/// Load a report from a JSON file. Returns None if the file doesn't exist or
/// doesn't parse.
pub fn load_report(path: &Path) -> Option<Report> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

pub fn save_report(path: &Path, report: &Report) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// Format results as a markdown summary table.
pub fn format_markdown(results: &[SceneResult]) -> String {
    let mut out = String::new();
    out.push_str("| Scene | Mode | Frames | Volumes | Lights | Overlays | Culled | Skipped | Failures | Textures | Mean (us) | Max (us) |\n");
    out.push_str("|-------|------|--------|---------|--------|----------|--------|---------|----------|----------|-----------|----------|\n");

    for r in results {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {:.1} | {:.1} |\n",
            r.scene_name,
            r.mode,
            r.frames,
            r.live_volumes,
            r.light_volumes,
            r.totals.overlays_drawn,
            r.totals.pairs_culled,
            r.totals.skipped,
            r.totals.backend_failures,
            r.textures_created,
            r.mean_frame_us,
            r.max_frame_us,
        ));
    }

    out
}

/// Slot table for the final frame of each scene.
pub fn format_slots(results: &[SceneResult]) -> String {
    let mut out = String::new();
    for r in results {
        out.push_str(&format!("{}:", r.scene_name));
        for (name, slot) in &r.slots {
            out.push_str(&format!(" {}={}", name, slot));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::SceneTotals;

    fn result(name: &str) -> SceneResult {
        SceneResult {
            scene_name: name.to_string(),
            mode: "headless".into(),
            frames: 2,
            live_volumes: 1,
            light_volumes: 1,
            final_overlays: 0,
            totals: SceneTotals {
                overlays_drawn: 3,
                ..Default::default()
            },
            textures_created: 1,
            mean_frame_us: 12.5,
            max_frame_us: 20.0,
            slots: vec![("a".into(), -1), ("b".into(), 0)],
        }
    }

    #[test]
    fn test_markdown_has_row_per_scene() {
        let table = format_markdown(&[result("one"), result("two")]);
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("| one | headless | 2 | 1 | 1 | 3 |"));
    }

    #[test]
    fn test_slots_line() {
        assert_eq!(format_slots(&[result("one")]), "one: a=-1 b=0\n");
    }

    #[test]
    fn test_report_json_round_trip() {
        let report = Report {
            timestamp: "t".into(),
            results: vec![result("one")],
        };
        let path = std::env::temp_dir().join(format!("sdfvol-report-{}.json", std::process::id()));
        save_report(&path, &report).expect("write report");
        assert_eq!(load_report(&path), Some(report));
        let _ = std::fs::remove_file(&path);
    }
}
