//! Background reclamation of retired method versions.

use super::table::ClassTable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Periodically scans the retired lists and frees method versions nothing
/// references any more. The scan itself lives in
/// [`ClassTable::reclaim_retired`]; this just owns the thread.
pub struct Reclaimer {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reclaimer {
    pub fn spawn(table: Arc<ClassTable>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name("relic-reclaim".to_owned())
            .spawn(move || {
                debug!("method version reclaimer running every {:?}", interval);
                while !thread_shutdown.load(Ordering::SeqCst) {
                    std::thread::sleep(interval);
                    table.reclaim_retired();
                }
            })
            .unwrap_or_else(|e| panic!("failed to spawn the reclaimer thread: {}", e));
        Reclaimer {
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::classfile::testing::ClassBytesBuilder;
    use super::*;

    #[test]
    fn reclaimer_frees_unreferenced_versions() {
        let table = Arc::new(ClassTable::new(4));
        let bytes = |code: u8| {
            ClassBytesBuilder::new("demo/Widget")
                .method("run", 0, &[code])
                .build()
        };
        let id = table.define(&bytes(0)).unwrap();
        table.redefine(id, &bytes(1)).unwrap();
        assert_eq!(table.retired_count(id), 1);

        let _reclaimer = Reclaimer::spawn(table.clone(), Duration::from_millis(5));
        crate::util::test_util::panic_after(1000, move || {
            while table.retired_count(id) > 0 {
                std::thread::sleep(Duration::from_millis(5));
            }
        });
    }
}
