//! RenderClock synchronisation tests

#[cfg(test)]
mod tests {
    use bounce_stream::protocol::ChunkBuilder;
    use bounce_stream::{
        Canvas, FrameStore, Generation, PlaybackView, RenderClock, ScreenPoint, SessionState,
        Viewport,
    };
    use std::time::{Duration, Instant};

    // 0.125 s per sample keeps every time value exact in binary.
    const PERIOD: f64 = 0.125;
    const ZOOM_CAP: f64 = 200.0;

    #[derive(Default)]
    struct RecordingCanvas {
        clears: usize,
        axes: usize,
        lines: Vec<Vec<ScreenPoint>>,
        scales: Vec<(f64, f64)>,
    }

    impl Canvas for RecordingCanvas {
        fn clear(&mut self) {
            self.clears += 1;
        }

        fn axes(&mut self, viewport: &Viewport) {
            self.axes += 1;
            self.scales.push(viewport.scale());
        }

        fn polyline(&mut self, points: &[ScreenPoint]) {
            self.lines.push(points.to_vec());
        }
    }

    fn clock() -> RenderClock {
        RenderClock::new(Viewport::new(800.0, 600.0, ZOOM_CAP), 1.0)
    }

    fn store_with(samples: &[f32], capacity: usize) -> FrameStore {
        let mut store = FrameStore::new(capacity);
        append(&mut store, samples);
        store
    }

    /// Append `samples` as full chunks of the store's capacity (last may be short).
    fn append(store: &mut FrameStore, samples: &[f32]) {
        for part in samples.chunks(store.capacity()) {
            let mut b = ChunkBuilder::new(store.next_expected(), store.capacity());
            for v in part {
                b.push(*v);
            }
            store.add_chunk(b.seal()).unwrap();
        }
    }

    fn view(state: SessionState, store: &FrameStore) -> PlaybackView<'_> {
        view_of(Generation(1), state, store)
    }

    fn view_of(
        generation: Generation,
        state: SessionState,
        store: &FrameStore,
    ) -> PlaybackView<'_> {
        PlaybackView {
            generation,
            state,
            store,
            sample_period: PERIOD,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    // -----------------------------------------------------------------------
    // BeforeStart
    // -----------------------------------------------------------------------

    #[test]
    fn before_start_draws_axes_only() {
        let store = FrameStore::new(4);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();

        let r = c.tick(Instant::now(), view(SessionState::BeforeStart, &store), &mut canvas);
        assert_eq!(r.elapsed, 0.0);
        assert!(!r.advanced);
        assert_eq!(canvas.clears, 1);
        assert_eq!(canvas.axes, 1);
        assert!(canvas.lines.is_empty());
    }

    #[test]
    fn returning_to_before_start_rewinds() {
        let store = store_with(&[0.0; 16], 4);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();

        c.tick(t0, view(SessionState::Running, &store), &mut canvas);
        c.tick(t0 + ms(500), view(SessionState::Running, &store), &mut canvas);
        assert!(c.elapsed() > 0.0);

        c.tick(t0 + ms(600), view(SessionState::BeforeStart, &store), &mut canvas);
        assert_eq!(c.elapsed(), 0.0);
        assert_eq!(c.viewport().visible_range(), (0.0, 0.0));
    }

    #[test]
    fn new_generation_rewinds_without_before_start() {
        let old = store_with(&[2.0; 16], 4);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();
        let running = SessionState::Running;

        c.tick(t0, view_of(Generation(1), running, &old), &mut canvas);
        let r = c.tick(t0 + ms(1000), view_of(Generation(1), running, &old), &mut canvas);
        assert_eq!(r.elapsed, 1.0);

        // restarted session, nothing received yet
        let fresh = FrameStore::new(4);
        let r = c.tick(t0 + ms(1100), view_of(Generation(3), running, &fresh), &mut canvas);
        assert_eq!(r.elapsed, 0.0);
        assert_eq!(r.playhead, 0);
        assert!(!r.advanced);
        assert_eq!(c.viewport().visible_range(), (0.0, 0.0));

        // first chunk arrives: playback resumes from zero, not from 1.0
        let fresh = store_with(&[1.0, 1.0, 1.0, 1.0], 4);
        let r = c.tick(t0 + ms(1200), view_of(Generation(3), running, &fresh), &mut canvas);
        assert!(r.advanced);
        assert_eq!(r.drawn, 1);
        assert_eq!(r.elapsed, 0.1);
    }

    // -----------------------------------------------------------------------
    // Freeze / advance
    // -----------------------------------------------------------------------

    #[test]
    fn empty_store_freezes_time() {
        let store = FrameStore::new(4);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();

        for k in 0..5 {
            let r = c.tick(t0 + ms(16 * k), view(SessionState::Running, &store), &mut canvas);
            assert!(!r.advanced);
            assert_eq!(r.drawn, 0);
        }
        assert_eq!(c.elapsed(), 0.0);
    }

    #[test]
    fn clock_freezes_at_missing_sample_and_resumes() {
        let mut store = store_with(&[1.0, 2.0, 3.0, 4.0], 4);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();

        // first tick only records the wall time
        let r = c.tick(t0, view(SessionState::Running, &store), &mut canvas);
        assert!(!r.advanced);
        assert_eq!(r.elapsed, 0.0);

        let r = c.tick(t0 + ms(250), view(SessionState::Running, &store), &mut canvas);
        assert!(r.advanced);
        assert_eq!(r.elapsed, 0.25);

        let r = c.tick(t0 + ms(500), view(SessionState::Running, &store), &mut canvas);
        assert_eq!(r.playhead, 2);
        assert_eq!(r.drawn, 3);
        assert_eq!(r.elapsed, 0.5);

        // needs sample 4, which has not arrived
        let r = c.tick(t0 + ms(750), view(SessionState::Running, &store), &mut canvas);
        assert_eq!(r.playhead, 4);
        assert!(!r.advanced);
        assert_eq!(r.drawn, 4);
        assert_eq!(r.elapsed, 0.5);

        let r = c.tick(t0 + ms(1000), view(SessionState::Running, &store), &mut canvas);
        assert!(!r.advanced);
        assert_eq!(r.elapsed, 0.5);

        // data arrives; clock moves by the delta since the previous tick only
        append(&mut store, &[5.0, 6.0, 7.0, 8.0]);
        let r = c.tick(t0 + ms(1250), view(SessionState::Running, &store), &mut canvas);
        assert!(r.advanced);
        assert_eq!(r.drawn, 5);
        assert_eq!(r.elapsed, 0.75);
    }

    #[test]
    fn elapsed_is_monotonic_under_irregular_delivery() {
        let mut store = FrameStore::new(3);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();
        let mut previous = 0.0;
        let mut value = 0.0f32;

        for k in 1..200u64 {
            if k % 7 == 0 || k % 11 == 0 {
                let batch: Vec<f32> = (0..3)
                    .map(|_| {
                        value += 0.5;
                        value
                    })
                    .collect();
                append(&mut store, &batch);
            }
            let r = c.tick(t0 + ms(40 * k), view(SessionState::Running, &store), &mut canvas);
            assert!(r.elapsed >= previous, "elapsed went backwards at tick {}", k);
            if r.advanced {
                assert!(r.playhead < store.len_samples());
            }
            previous = r.elapsed;
        }
    }

    #[test]
    fn playback_rate_scales_wall_time() {
        let store = store_with(&[0.0; 64], 8);
        let mut c = RenderClock::new(Viewport::new(800.0, 600.0, ZOOM_CAP), 2.0);
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();

        c.tick(t0, view(SessionState::Running, &store), &mut canvas);
        let r = c.tick(t0 + ms(250), view(SessionState::Running, &store), &mut canvas);
        assert_eq!(r.elapsed, 0.5);
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    #[test]
    fn polyline_matches_available_prefix() {
        let store = store_with(&[0.5, 1.0, 1.5, 2.0, 2.5, 3.0], 2);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();

        c.tick(t0, view(SessionState::Running, &store), &mut canvas);
        c.tick(t0 + ms(375), view(SessionState::Running, &store), &mut canvas);
        c.tick(t0 + ms(400), view(SessionState::Running, &store), &mut canvas);

        let line = canvas.lines.last().unwrap();
        assert_eq!(line.len(), 4);
        // x strictly increases along the line
        assert!(line.windows(2).all(|w| w[1].x > w[0].x));
        // rising samples are drawn higher on screen
        assert!(line.windows(2).all(|w| w[1].y < w[0].y));
    }

    #[test]
    fn zoom_never_exceeds_cap() {
        let samples: Vec<f32> = (0..400).map(|i| (i as f32) * 10.0).collect();
        let store = store_with(&samples, 16);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();

        for k in 0..100u64 {
            c.tick(t0 + ms(100 * k), view(SessionState::Running, &store), &mut canvas);
        }
        assert!(canvas
            .scales
            .iter()
            .all(|&(sx, sy)| sx <= ZOOM_CAP && sy <= ZOOM_CAP));
    }

    #[test]
    fn ended_session_finishes_when_caught_up() {
        let store = store_with(&[1.0, 1.0, 1.0], 4);
        let mut c = clock();
        let mut canvas = RecordingCanvas::default();
        let t0 = Instant::now();

        let mut finished = false;
        for k in 0..20u64 {
            let r = c.tick(t0 + ms(100 * k), view(SessionState::Ended, &store), &mut canvas);
            if r.finished {
                assert_eq!(r.drawn, 3);
                finished = true;
                break;
            }
        }
        assert!(finished);
    }
}
