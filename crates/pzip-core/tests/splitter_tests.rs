mod support;

use pzip_core::{FileHandle, FileSource, MmapFileSource, PageData, PageSplitter, ReadFileSource};
use support::{TestResult, patterned, write_inputs};
use tempfile::tempdir;

#[test]
fn pages_reassemble_the_file_exactly() -> TestResult {
    let data = patterned(10_007, 3);
    let handle = FileHandle::from_bytes(0, "memory", data.clone());

    for page_size in [1usize, 7, 4096, 10_007, 20_000] {
        let splitter = PageSplitter::new(page_size);
        let mut rebuilt = Vec::new();
        let mut expected_index = 0u64;
        let pages = splitter.pages(&handle);
        assert_eq!(pages.len() as u64, splitter.page_count(data.len() as u64));

        for page in pages {
            let page = page?;
            assert_eq!(page.page_index, expected_index);
            assert_eq!(page.file_index, 0);
            expected_index += 1;
            let is_last = rebuilt.len() + page.len() == data.len();
            assert_eq!(page.is_last_page, is_last);
            if !is_last {
                assert_eq!(page.len(), page_size);
            }
            rebuilt.extend_from_slice(page.data());
        }
        assert_eq!(rebuilt, data, "page_size={page_size}");
    }
    Ok(())
}

#[test]
fn last_page_holds_the_remainder() -> TestResult {
    let handle = FileHandle::from_bytes(2, "memory", vec![0u8; 10]);
    let pages = PageSplitter::new(4)
        .pages(&handle)
        .collect::<Result<Vec<_>, _>>()?;
    let lengths: Vec<usize> = pages.iter().map(|page| page.len()).collect();
    assert_eq!(lengths, vec![4, 4, 2]);
    assert!(pages.iter().all(|page| page.file_index == 2));

    let exact = FileHandle::from_bytes(0, "memory", vec![0u8; 8]);
    let pages = PageSplitter::new(4)
        .pages(&exact)
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].len(), 4);
    assert!(pages[1].is_last_page);
    Ok(())
}

#[test]
fn empty_file_yields_no_pages() -> TestResult {
    let dir = tempdir()?;
    let paths = write_inputs(dir.path(), &[b""])?;
    for source in [&MmapFileSource as &dyn FileSource, &ReadFileSource] {
        let handle = source.open(0, &paths[0])?;
        assert!(handle.is_empty());
        assert_eq!(PageSplitter::new(4096).pages(&handle).count(), 0);
    }
    Ok(())
}

#[test]
fn mapped_pages_share_the_file_mapping() -> TestResult {
    let dir = tempdir()?;
    let data = patterned(9_000, 8);
    let paths = write_inputs(dir.path(), &[&data])?;

    let handle = MmapFileSource.open(0, &paths[0])?;
    let pages = PageSplitter::new(4096)
        .pages(&handle)
        .collect::<Result<Vec<_>, _>>()?;
    drop(handle);
    assert!(
        pages
            .iter()
            .all(|page| matches!(page.data, PageData::Mapped { .. }))
    );

    let rebuilt: Vec<u8> = pages.iter().flat_map(|page| page.data().to_vec()).collect();
    assert_eq!(rebuilt, data);
    Ok(())
}

#[test]
fn missing_file_is_a_file_access_error() {
    let error = MmapFileSource
        .open(0, std::path::Path::new("/definitely/not/here.bin"))
        .err();
    assert!(error.is_some_and(|error| error.is_file_access()));
}
