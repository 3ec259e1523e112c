mod support;

use pzip_core::{FileErrorPolicy, PipelineConfig, PzipError, RlePipeline, Run, SourceKind};
use support::{TestResult, write_inputs};
use tempfile::tempdir;

fn config(policy: FileErrorPolicy, source_kind: SourceKind) -> PipelineConfig {
    let mut config = PipelineConfig::new(3);
    config.page_size = 2;
    config.file_error_policy = policy;
    config.source_kind = source_kind;
    config
}

#[test]
fn abort_policy_fails_both_paths() -> TestResult {
    let dir = tempdir()?;
    let mut paths = write_inputs(dir.path(), &[b"aaaa", b"bbbb"])?;
    paths.insert(1, dir.path().join("missing.bin"));

    let pipeline = RlePipeline::new(config(FileErrorPolicy::Abort, SourceKind::Mmap));
    let parallel = pipeline.encode_paths(&paths, Vec::new());
    assert!(matches!(parallel, Err(PzipError::FileAccess { .. })));

    let sequential = pipeline.encode_sequential(&paths, Vec::new());
    assert!(matches!(sequential, Err(PzipError::FileAccess { .. })));
    Ok(())
}

#[test]
fn skip_policy_treats_unreadable_files_as_empty() -> TestResult {
    let dir = tempdir()?;
    let mut paths = write_inputs(dir.path(), &[b"aaaa", b"abbb"])?;
    let missing = dir.path().join("missing.bin");
    paths.insert(1, missing.clone());
    paths.push(dir.path().join("also-missing.bin"));

    for source_kind in [SourceKind::Mmap, SourceKind::Read] {
        let pipeline = RlePipeline::new(config(FileErrorPolicy::Skip, source_kind));
        let expected = vec![Run::new(b'a', 4), Run::new(b'a', 1), Run::new(b'b', 3)];

        let (parallel, parallel_stats) = pipeline.encode_paths(&paths, Vec::new())?;
        assert_eq!(parallel, expected);
        assert_eq!(parallel_stats.skipped_files.len(), 2);
        assert_eq!(parallel_stats.skipped_files[0], missing);

        let (sequential, sequential_stats) = pipeline.encode_sequential(&paths, Vec::new())?;
        assert_eq!(sequential, expected);
        assert_eq!(sequential_stats.skipped_files, parallel_stats.skipped_files);
    }
    Ok(())
}

#[test]
fn failing_sink_aborts_the_run() -> TestResult {
    struct FailingSink {
        accepted: usize,
    }

    impl pzip_core::RunSink for FailingSink {
        fn write_run(&mut self, _run: &Run) -> pzip_core::Result<()> {
            if self.accepted == 3 {
                return Err(std::io::Error::other("disk full").into());
            }
            self.accepted += 1;
            Ok(())
        }
    }

    let dir = tempdir()?;
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 7) as u8).collect();
    let paths = write_inputs(dir.path(), &[&data])?;
    let mut config = PipelineConfig::new(4);
    config.page_size = 64;
    config.queue_capacity = Some(4);

    let outcome = RlePipeline::new(config).encode_paths(&paths, FailingSink { accepted: 0 });
    assert!(matches!(outcome, Err(PzipError::Io(_))));
    Ok(())
}
