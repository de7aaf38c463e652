use std::io::Write;
use std::path::{Path, PathBuf};

use crate::agent_engine::iteration::Iteration;
use crate::errors::PointClawResult;
use crate::perception::types::CaptureFrame;

/// Sink for per-iteration records. A failing recorder never stops the loop;
/// the engine logs the error and carries on.
pub trait IterationRecorder {
    fn record(&mut self, iteration: &Iteration, frame: Option<&CaptureFrame>) -> PointClawResult<()>;
}

/// Writes one directory per session:
///
/// ```text
/// session_<YYYYmmdd_HHMMSS>_<id>/
///   iter_0001_raw.png
///   iter_0001_grid.png
///   iter_0001_llm.json
///   iterations.jsonl
/// ```
pub struct SessionRecorder {
    pub session_id: String,
    dir: PathBuf,
}

impl SessionRecorder {
    pub fn create(root: &Path) -> PointClawResult<Self> {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let session_id = uuid[..8].to_string();
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let dir = root.join(format!("session_{stamp}_{session_id}"));
        std::fs::create_dir_all(&dir)?;
        tracing::info!(path = %dir.display(), "session directory created");
        Ok(Self { session_id, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append_line(&self, iteration: &Iteration) -> PointClawResult<()> {
        let line = serde_json::to_string(iteration)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join("iterations.jsonl"))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl IterationRecorder for SessionRecorder {
    fn record(&mut self, iteration: &Iteration, frame: Option<&CaptureFrame>) -> PointClawResult<()> {
        let prefix = format!("iter_{:04}", iteration.number);
        if let Some(frame) = frame {
            std::fs::write(self.dir.join(format!("{prefix}_raw.png")), &frame.raw_png)?;
            std::fs::write(self.dir.join(format!("{prefix}_grid.png")), &frame.annotated_png)?;
        }
        if iteration.raw_response.is_some() || iteration.plan.is_some() {
            let llm = serde_json::json!({
                "raw": iteration.raw_response,
                "plan": iteration.plan,
                "dropped": iteration.dropped,
            });
            std::fs::write(
                self.dir.join(format!("{prefix}_llm.json")),
                serde_json::to_vec_pretty(&llm)?,
            )?;
        }
        self.append_line(iteration)?;
        tracing::debug!(iteration = iteration.number, path = %self.dir.display(), "iteration recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::types::ActionPlan;

    fn frame() -> CaptureFrame {
        CaptureFrame {
            raw_png: vec![1, 2, 3],
            annotated_png: vec![4, 5, 6],
            annotated_base64: "BAUG".into(),
            width: 1,
            height: 1,
            captured_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_session_layout() {
        let root = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::create(root.path()).unwrap();
        let name = recorder.dir().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("session_"));
        assert!(name.ends_with(&recorder.session_id));

        let mut it = Iteration::new(1);
        it.raw_response = Some("{\"description\":\"x\"}".into());
        it.plan = Some(ActionPlan {
            description: "x".into(),
            plan: "y".into(),
            clicks: vec![],
        });
        recorder.record(&it, Some(&frame())).unwrap();
        recorder.record(&Iteration::new(2), None).unwrap();

        let dir = recorder.dir();
        assert_eq!(std::fs::read(dir.join("iter_0001_raw.png")).unwrap(), vec![1, 2, 3]);
        assert_eq!(std::fs::read(dir.join("iter_0001_grid.png")).unwrap(), vec![4, 5, 6]);
        let llm: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("iter_0001_llm.json")).unwrap()).unwrap();
        assert_eq!(llm["plan"]["plan"], "y");
        assert!(!dir.join("iter_0002_raw.png").exists());

        let log = std::fs::read_to_string(dir.join("iterations.jsonl")).unwrap();
        let numbers: Vec<u64> = log
            .lines()
            .map(|l| serde_json::from_str::<Iteration>(l).unwrap().number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }
}
