use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pzip_core::{OrderingCoordinator, PzipError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn merges_follow_file_then_page_order() -> Result<(), Box<dyn std::error::Error>> {
    // (file, pages) in command-line order.
    let layout: Vec<(usize, u64)> = vec![(0, 5), (1, 1), (2, 7)];
    let slots = 3;
    let coordinator = Arc::new(OrderingCoordinator::new(slots));
    let merged = Arc::new(Mutex::new(Vec::new()));

    // Hand pages to threads in reverse so late pages arrive first.
    let mut pages: Vec<(usize, u64, bool)> = layout
        .iter()
        .flat_map(|&(file, count)| (0..count).map(move |page| (file, page, page + 1 == count)))
        .collect();
    pages.reverse();

    let handles: Vec<_> = pages
        .into_iter()
        .map(|(file, page, last)| {
            let coordinator = Arc::clone(&coordinator);
            let merged = Arc::clone(&merged);
            thread::spawn(move || -> Result<(), PzipError> {
                let token = coordinator.acquire(file, page)?;
                lock(&merged).push((file, page));
                token.release(last)
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| std::io::Error::other("merge thread panicked"))??;
    }

    let expected: Vec<(usize, u64)> = layout
        .iter()
        .flat_map(|&(file, count)| (0..count).map(move |page| (file, page)))
        .collect();
    assert_eq!(*lock(&merged), expected);
    assert!(coordinator.is_complete(layout.len()));
    Ok(())
}

#[test]
fn gate_is_ticketed_by_page_index() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = Arc::new(OrderingCoordinator::new(2));

    // Page 2 shares slot 0 with page 0 but must not take page 0's turn.
    let early = {
        let coordinator = Arc::clone(&coordinator);
        thread::spawn(move || -> Result<u64, PzipError> {
            let token = coordinator.acquire(0, 2)?;
            let page = token.page_index();
            token.release(true)?;
            Ok(page)
        })
    };
    thread::sleep(Duration::from_millis(20));
    assert!(!early.is_finished());

    coordinator.acquire(0, 0)?.release(false)?;
    coordinator.acquire(0, 1)?.release(false)?;
    let page = early
        .join()
        .map_err(|_| std::io::Error::other("merge thread panicked"))??;
    assert_eq!(page, 2);
    assert_eq!(coordinator.active_file(), 1);
    Ok(())
}

#[test]
fn skipped_files_are_passed_over() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = OrderingCoordinator::new(4);
    coordinator.skip_file(0)?;
    coordinator.skip_file(2)?;
    coordinator.skip_file(3)?;
    assert_eq!(coordinator.active_file(), 1);

    coordinator.acquire(1, 0)?.release(true)?;
    assert_eq!(coordinator.active_file(), 4);

    coordinator.acquire(4, 0)?.release(true)?;
    assert!(coordinator.is_complete(5));
    Ok(())
}

#[test]
fn page_of_a_finished_file_is_a_protocol_violation() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = OrderingCoordinator::new(2);
    coordinator.acquire(0, 0)?.release(true)?;
    assert!(matches!(
        coordinator.acquire(0, 1),
        Err(PzipError::ProtocolViolation(_))
    ));
    assert!(matches!(
        coordinator.skip_file(0),
        Err(PzipError::ProtocolViolation(_))
    ));
    Ok(())
}

#[test]
fn abort_releases_every_waiter() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = Arc::new(OrderingCoordinator::new(2));
    let waiters: Vec<_> = [(0usize, 1u64), (1, 0), (3, 5)]
        .into_iter()
        .map(|(file, page)| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.acquire(file, page).map(|token| token.page_index()))
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    coordinator.abort();
    for waiter in waiters {
        let outcome = waiter
            .join()
            .map_err(|_| std::io::Error::other("waiter panicked"))?;
        assert!(matches!(outcome, Err(PzipError::Aborted)));
    }
    assert!(coordinator.is_aborted());
    Ok(())
}

#[test]
fn dropping_an_unreleased_token_aborts() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = OrderingCoordinator::new(1);
    let token = coordinator.acquire(0, 0)?;
    drop(token);
    assert!(coordinator.is_aborted());
    assert!(matches!(
        coordinator.acquire(0, 1),
        Err(PzipError::Aborted)
    ));
    Ok(())
}
