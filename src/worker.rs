use crate::{
    file_ops::{self, CopyReport, FileOpError, FileOpResult, StructureOutcome},
    skin::SkinTypeInfo,
};
use std::{
    path::PathBuf,
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
};

#[derive(Debug, Clone)]
pub enum FileOp {
    ApplySkin {
        skin_dir: PathBuf,
        game_dir: PathBuf,
    },
    CreateBackup {
        skin_dir: PathBuf,
        backup_dir: PathBuf,
        game_dir: PathBuf,
    },
    RestoreBackup {
        backup_dir: PathBuf,
        game_dir: PathBuf,
    },
    CreateStructure {
        catalog: Vec<SkinTypeInfo>,
        skins_root: PathBuf,
    },
    ExtractSkin {
        archive: PathBuf,
        destination: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOpOutput {
    Copied(CopyReport),
    Structure(StructureOutcome),
    Extracted(usize),
}

impl FileOp {
    /// Runs on the calling thread.
    pub fn run(self) -> FileOpResult<FileOpOutput> {
        match self {
            FileOp::ApplySkin { skin_dir, game_dir } => {
                file_ops::apply_skin(&skin_dir, &game_dir).map(FileOpOutput::Copied)
            }
            FileOp::CreateBackup {
                skin_dir,
                backup_dir,
                game_dir,
            } => file_ops::create_backup(&skin_dir, &backup_dir, &game_dir)
                .map(FileOpOutput::Copied),
            FileOp::RestoreBackup {
                backup_dir,
                game_dir,
            } => file_ops::restore_backup(&backup_dir, &game_dir).map(FileOpOutput::Copied),
            FileOp::CreateStructure {
                catalog,
                skins_root,
            } => file_ops::create_structure(&catalog, &skins_root).map(FileOpOutput::Structure),
            FileOp::ExtractSkin {
                archive,
                destination,
            } => file_ops::extract_skin(&archive, &destination).map(FileOpOutput::Extracted),
        }
    }
}

struct Job {
    op: FileOp,
    reply: Sender<FileOpResult<FileOpOutput>>,
}

/// A single background thread that runs file operations in submission order.
pub struct FileOpWorker {
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl FileOpWorker {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = thread::spawn(move || {
            for job in rx {
                let result = job.op.run();
                let _ = job.reply.send(result);
            }
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn submit(&self, op: FileOp) -> PendingOp {
        let (reply, rx) = mpsc::channel();
        if let Some(tx) = &self.tx {
            if let Err(mpsc::SendError(job)) = tx.send(Job { op, reply }) {
                let _ = job.reply.send(Err(FileOpError::WorkerStopped));
            }
        }
        PendingOp { rx }
    }

    /// Submits and blocks until the operation has finished.
    pub fn run(&self, op: FileOp) -> FileOpResult<FileOpOutput> {
        self.submit(op).wait()
    }
}

impl Drop for FileOpWorker {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Result slot of a submitted operation.
pub struct PendingOp {
    rx: Receiver<FileOpResult<FileOpOutput>>,
}

impl PendingOp {
    pub fn wait(self) -> FileOpResult<FileOpOutput> {
        self.rx.recv().unwrap_or(Err(FileOpError::WorkerStopped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_ops::FileOpErrorKind;
    use std::{fs, path::Path};
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn queued_operations_run_in_order() {
        let tmp = TempDir::new().unwrap();
        let skin = tmp.path().join("skin");
        let game = tmp.path().join("game");
        let backup = tmp.path().join("backup");
        write(&game.join("A"), "v1");
        write(&skin.join("A"), "v2");

        let worker = FileOpWorker::spawn();
        let backup_op = worker.submit(FileOp::CreateBackup {
            skin_dir: skin.clone(),
            backup_dir: backup.clone(),
            game_dir: game.clone(),
        });
        let apply_op = worker.submit(FileOp::ApplySkin {
            skin_dir: skin.clone(),
            game_dir: game.clone(),
        });

        let apply = apply_op.wait().unwrap();
        let saved = backup_op.wait().unwrap();
        assert_eq!(
            saved,
            FileOpOutput::Copied(CopyReport {
                copied: 1,
                skipped: 0
            })
        );
        assert_eq!(
            apply,
            FileOpOutput::Copied(CopyReport {
                copied: 1,
                skipped: 0
            })
        );
        assert_eq!(fs::read_to_string(backup.join("A")).unwrap(), "v1");
        assert_eq!(fs::read_to_string(game.join("A")).unwrap(), "v2");
    }

    #[test]
    fn errors_come_back_typed() {
        let tmp = TempDir::new().unwrap();
        let worker = FileOpWorker::spawn();
        let err = worker
            .run(FileOp::RestoreBackup {
                backup_dir: tmp.path().join("missing"),
                game_dir: tmp.path().to_path_buf(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), FileOpErrorKind::MissingDirectory);
    }
}
