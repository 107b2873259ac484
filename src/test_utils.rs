pub mod test_helpers {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    use flume::{Receiver, Sender};

    use crate::viewer::{
        DocumentHandle, Page, PageFault, Surface, TextRun, ViewBox, Viewport,
    };

    /// Pages drawn by a [`ScriptedDocument`], in draw order
    #[derive(Clone, Default)]
    pub struct DrawLog {
        pages: Arc<Mutex<Vec<usize>>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl DrawLog {
        pub fn pages(&self) -> Vec<usize> {
            self.pages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Highest number of draws ever running at the same time
        pub fn max_concurrent(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn enter(&self, page: usize) {
            self.pages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(page);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Holds draws of one page until opened
    pub struct Gate {
        tx: Sender<()>,
    }

    impl Gate {
        /// Let one blocked draw finish
        pub fn open(&self) {
            let _ = self.tx.send(());
        }
    }

    /// Letter-size document whose draws can be blocked, failed and observed
    pub struct ScriptedDocument {
        page_count: usize,
        draws: DrawLog,
        started_tx: Sender<usize>,
        started_rx: Receiver<usize>,
        gates: HashMap<usize, Receiver<()>>,
        failing: HashSet<usize>,
        failing_text: HashSet<usize>,
        panicking: HashSet<usize>,
    }

    impl ScriptedDocument {
        pub fn letter(page_count: usize) -> Self {
            let (started_tx, started_rx) = flume::unbounded();
            Self {
                page_count,
                draws: DrawLog::default(),
                started_tx,
                started_rx,
                gates: HashMap::new(),
                failing: HashSet::new(),
                failing_text: HashSet::new(),
                panicking: HashSet::new(),
            }
        }

        /// Block every draw of `page` until the returned gate is opened
        pub fn gate(&mut self, page: usize) -> Gate {
            let (tx, rx) = flume::unbounded();
            self.gates.insert(page, rx);
            Gate { tx }
        }

        /// Make draws of `page` fail
        pub fn fail_page(mut self, page: usize) -> Self {
            self.failing.insert(page);
            self
        }

        /// Make text extraction of `page` fail
        pub fn fail_text(mut self, page: usize) -> Self {
            self.failing_text.insert(page);
            self
        }

        /// Make draws of `page` panic, taking the render worker down
        pub fn panic_page(mut self, page: usize) -> Self {
            self.panicking.insert(page);
            self
        }

        pub fn draws(&self) -> DrawLog {
            self.draws.clone()
        }

        /// Receives a page number whenever a draw starts
        pub fn started(&self) -> Receiver<usize> {
            self.started_rx.clone()
        }
    }

    impl DocumentHandle for ScriptedDocument {
        fn page_count(&self) -> usize {
            self.page_count
        }

        fn page(&self, number: usize) -> Result<Box<dyn Page>, PageFault> {
            if number == 0 || number > self.page_count {
                return Err(PageFault::Missing { page: number });
            }
            Ok(Box::new(ScriptedPage {
                number,
                draws: self.draws.clone(),
                started: self.started_tx.clone(),
                gate: self.gates.get(&number).cloned(),
                fail: self.failing.contains(&number),
                fail_text: self.failing_text.contains(&number),
                panic: self.panicking.contains(&number),
            }))
        }
    }

    struct ScriptedPage {
        number: usize,
        draws: DrawLog,
        started: Sender<usize>,
        gate: Option<Receiver<()>>,
        fail: bool,
        fail_text: bool,
        panic: bool,
    }

    impl Page for ScriptedPage {
        fn number(&self) -> usize {
            self.number
        }

        fn view_box(&self) -> ViewBox {
            ViewBox::from_size(612.0, 792.0)
        }

        fn draw(&self, surface: &mut Surface, _viewport: &Viewport) -> Result<(), PageFault> {
            self.draws.enter(self.number);
            let _ = self.started.send(self.number);
            if let Some(gate) = &self.gate {
                // a dropped gate releases the draw as well
                let _ = gate.recv();
            }
            if self.panic {
                panic!("page {} is scripted to panic", self.number);
            }

            let result = if self.fail {
                Err(PageFault::generic(format!(
                    "page {} is scripted to fail",
                    self.number
                )))
            } else {
                surface.fill(page_colour(self.number));
                Ok(())
            };
            self.draws.leave();
            result
        }

        fn text_content(&self) -> Result<Vec<TextRun>, PageFault> {
            if self.fail_text {
                return Err(PageFault::generic("no text layer"));
            }
            Ok(vec![TextRun {
                text: format!("page {}", self.number),
                x: 72.0,
                y: 720.0,
                width: 60.0,
                height: 12.0,
            }])
        }
    }

    /// Colour a scripted page fills the surface with
    pub fn page_colour(page: usize) -> [u8; 4] {
        [(page % 256) as u8, 0, 0, 255]
    }
}
