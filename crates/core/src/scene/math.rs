//! Generative math visuals. Each keeps just enough state to advance its
//! animation deterministically; drawing happens in the rendering backend.

use std::{collections::VecDeque, f64::consts::TAU};

use super::{
    params::{flag, number, text, ParamSchema, ParamSpec, Params},
    FrameContext, Scene, SceneResult,
};
use crate::error::SceneError;

const DEFAULT_TRAIL: usize = 512;
const MIN_TRAIL: usize = 32;

const LISSAJOUS_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Number { name: "a", min: 1.0, max: 10.0, default: 3.0, integer: false },
    ParamSpec::Number { name: "b", min: 1.0, max: 10.0, default: 2.0, integer: false },
    ParamSpec::Number { name: "delta", min: 0.0, max: TAU, default: 0.0, integer: false },
    ParamSpec::Number { name: "speed", min: 0.1, max: 3.0, default: 1.0, integer: false },
    ParamSpec::Number { name: "amplitude", min: 0.1, max: 0.9, default: 0.4, integer: false },
    ParamSpec::Number { name: "lineWidth", min: 0.5, max: 10.0, default: 2.0, integer: false },
    ParamSpec::Number { name: "trailAlpha", min: 0.0, max: 1.0, default: 0.05, integer: false },
    ParamSpec::Color { name: "color", default: "#39FF14" },
]);

/// Lissajous curve traced as a fading trail of points.
#[derive(Debug)]
pub struct Lissajous {
    params: Params,
    trail: VecDeque<(f64, f64)>,
    trail_len: usize,
}

impl Lissajous {
    pub fn new() -> Self {
        Self {
            params: LISSAJOUS_SCHEMA.defaults(),
            trail: VecDeque::new(),
            trail_len: DEFAULT_TRAIL,
        }
    }

    pub fn trail_len(&self) -> usize {
        self.trail_len
    }

    pub fn point_at(&self, time_ms: f64) -> (f64, f64) {
        let t = time_ms / 1000.0 * number(&self.params, "speed");
        let amplitude = number(&self.params, "amplitude");
        let x = amplitude * (number(&self.params, "a") * t + number(&self.params, "delta")).sin();
        let y = amplitude * (number(&self.params, "b") * t).sin();
        (x, y)
    }
}

impl Default for Lissajous {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for Lissajous {
    fn kind(&self) -> &str {
        "lissajous"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = LISSAJOUS_SCHEMA.resolve(params);
        self.params = resolved;
        self.trail.clear();
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        LISSAJOUS_SCHEMA.apply(&mut self.params, partial)
    }

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
        let point = self.point_at(ctx.time_ms);
        self.trail.push_back(point);
        while self.trail.len() > self.trail_len {
            self.trail.pop_front();
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.trail.clear();
    }

    fn reduce_complexity(&mut self) -> bool {
        if self.trail_len <= MIN_TRAIL {
            return false;
        }
        self.trail_len = (self.trail_len / 2).max(MIN_TRAIL);
        true
    }
}

const ROSES_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Positive { name: "k", default: 4.0 },
    ParamSpec::Number { name: "petalGlow", min: 0.0, max: 1.0, default: 0.6, integer: false },
    ParamSpec::Number { name: "speed", min: 0.1, max: 3.0, default: 1.0, integer: false },
    ParamSpec::Color { name: "color", default: "#FF3AF2" },
]);

/// Polar rose `r = cos(k * theta)` with an optional glow pass.
#[derive(Debug)]
pub struct PolarRoses {
    params: Params,
    theta: f64,
    radius: f64,
}

impl PolarRoses {
    pub fn new() -> Self {
        Self {
            params: ROSES_SCHEMA.defaults(),
            theta: 0.0,
            radius: 0.0,
        }
    }

    pub fn glow(&self) -> f64 {
        number(&self.params, "petalGlow")
    }
}

impl Default for PolarRoses {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for PolarRoses {
    fn kind(&self) -> &str {
        "polar_roses"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = ROSES_SCHEMA.resolve(params);
        self.params = resolved;
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        ROSES_SCHEMA.apply(&mut self.params, partial)
    }

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
        self.theta = (ctx.time_ms / 1000.0 * number(&self.params, "speed")) % TAU;
        self.radius = (number(&self.params, "k") * self.theta).cos();
        Ok(())
    }

    fn cleanup(&mut self) {}

    fn reduce_complexity(&mut self) -> bool {
        if self.glow() <= 0.0 {
            return false;
        }
        self.params.insert("petalGlow".into(), 0.0.into());
        true
    }
}

const PI_DIGITS: &str = "31415926535897932384626433832795028841971693993751058209749445923078164062862089986280348253421170679";
const E_DIGITS: &str = "27182818284590452353602874713526624977572470936999595749669676277240766303535475945713821785251664274";
const PRIME_DIGITS: &str = "2357111317192329313741434753596167717379838997101103107109113127131137139149151157163167173179181191";

const RAIN_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Choice { name: "charset", options: &["pi", "e", "primes"], default: "pi" },
    ParamSpec::Number { name: "density", min: 0.0, max: 1.0, default: 0.6, integer: false },
    ParamSpec::Number { name: "fontSize", min: 8.0, max: 48.0, default: 18.0, integer: true },
    ParamSpec::Number { name: "speed", min: 0.1, max: 3.0, default: 1.0, integer: false },
]);

/// Columns of falling digits drawn from a numeric constant.
#[derive(Debug)]
pub struct DigitsRain {
    params: Params,
    columns: Vec<f64>,
    cursor: usize,
}

impl DigitsRain {
    const WIDTH: f64 = 1920.0;
    const HEIGHT: f64 = 1080.0;

    pub fn new() -> Self {
        Self {
            params: RAIN_SCHEMA.defaults(),
            columns: Vec::new(),
            cursor: 0,
        }
    }

    pub fn density(&self) -> f64 {
        number(&self.params, "density")
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn digits(&self) -> &'static str {
        match text(&self.params, "charset") {
            "e" => E_DIGITS,
            "primes" => PRIME_DIGITS,
            _ => PI_DIGITS,
        }
    }

    /// Next digit to emit, cycling through the charset.
    pub fn next_digit(&mut self) -> char {
        let digits = self.digits().as_bytes();
        let digit = digits[self.cursor % digits.len()] as char;
        self.cursor += 1;
        digit
    }

    fn rebuild_columns(&mut self) {
        let font = number(&self.params, "fontSize").max(1.0);
        let count = ((Self::WIDTH / font) * self.density()).round() as usize;
        self.columns = (0..count)
            .map(|i| (i as f64 * 37.0) % Self::HEIGHT)
            .collect();
    }
}

impl Default for DigitsRain {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for DigitsRain {
    fn kind(&self) -> &str {
        "digits_rain"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = RAIN_SCHEMA.resolve(params);
        self.params = resolved;
        self.cursor = 0;
        self.rebuild_columns();
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        let reports = RAIN_SCHEMA.apply(&mut self.params, partial);
        self.rebuild_columns();
        reports
    }

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
        let step = ctx.delta_ms * 0.25 * number(&self.params, "speed");
        for y in &mut self.columns {
            *y = (*y + step) % Self::HEIGHT;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.columns.clear();
    }

    fn reduce_complexity(&mut self) -> bool {
        let density = self.density();
        if density <= 0.05 {
            return false;
        }
        self.params.insert("density".into(), (density / 2.0).max(0.05).into());
        self.rebuild_columns();
        true
    }
}

const LIFE_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Number { name: "stepMs", min: 50.0, max: 1000.0, default: 120.0, integer: false },
    ParamSpec::Number { name: "cellSize", min: 5.0, max: 20.0, default: 10.0, integer: true },
    ParamSpec::Number { name: "seed", min: 0.0, max: 4_294_967_295.0, default: 1.0, integer: true },
    ParamSpec::Flag { name: "wrap", default: true },
]);

/// Conway's Game of Life on a grid sized from the cell size.
#[derive(Debug)]
pub struct ConwayLife {
    params: Params,
    width: usize,
    height: usize,
    cells: Vec<bool>,
    since_step_ms: f64,
    generation: u64,
}

impl ConwayLife {
    const WIDTH: usize = 1280;
    const HEIGHT: usize = 720;

    pub fn new() -> Self {
        Self {
            params: LIFE_SCHEMA.defaults(),
            width: 0,
            height: 0,
            cells: Vec::new(),
            since_step_ms: 0.0,
            generation: 0,
        }
    }

    pub fn cell_size(&self) -> usize {
        number(&self.params, "cellSize") as usize
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn grid(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn alive(&self) -> usize {
        self.cells.iter().filter(|alive| **alive).count()
    }

    fn reseed(&mut self) {
        let cell = self.cell_size().max(1);
        self.width = Self::WIDTH / cell;
        self.height = Self::HEIGHT / cell;
        let mut state = (number(&self.params, "seed") as u64) | 1;
        self.cells = (0..self.width * self.height)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) % 4 == 0
            })
            .collect();
        self.generation = 0;
        self.since_step_ms = 0.0;
    }

    fn neighbours(&self, x: usize, y: usize) -> usize {
        let wrap = flag(&self.params, "wrap");
        let mut count = 0;
        for dy in [-1i64, 0, 1] {
            for dx in [-1i64, 0, 1] {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                let (w, h) = (self.width as i64, self.height as i64);
                let (nx, ny) = if wrap {
                    (nx.rem_euclid(w), ny.rem_euclid(h))
                } else if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                } else {
                    (nx, ny)
                };
                if self.cells[(ny * w + nx) as usize] {
                    count += 1;
                }
            }
        }
        count
    }

    /// Advances the simulation by one generation.
    pub fn step(&mut self) {
        let mut next = vec![false; self.cells.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let index = y * self.width + x;
                next[index] = matches!(
                    (self.cells[index], self.neighbours(x, y)),
                    (true, 2) | (true, 3) | (false, 3)
                );
            }
        }
        self.cells = next;
        self.generation += 1;
    }
}

impl Default for ConwayLife {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for ConwayLife {
    fn kind(&self) -> &str {
        "conway_life"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = LIFE_SCHEMA.resolve(params);
        self.params = resolved;
        self.reseed();
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        let before = self.cell_size();
        let reports = LIFE_SCHEMA.apply(&mut self.params, partial);
        if self.cell_size() != before || partial.contains_key("seed") {
            self.reseed();
        }
        reports
    }

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
        self.since_step_ms += ctx.delta_ms;
        let step_ms = number(&self.params, "stepMs");
        while self.since_step_ms >= step_ms {
            self.since_step_ms -= step_ms;
            self.step();
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.cells.clear();
    }

    fn reduce_complexity(&mut self) -> bool {
        let cell = self.cell_size();
        if cell >= 20 {
            return false;
        }
        self.params.insert("cellSize".into(), (cell * 2).min(20).into());
        self.reseed();
        true
    }
}

const MANDELBROT_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Number { name: "zoom", min: 0.1, max: 100.0, default: 1.0, integer: false },
    ParamSpec::Number { name: "maxIter", min: 10.0, max: 500.0, default: 100.0, integer: true },
    ParamSpec::Number { name: "centerX", min: -2.0, max: 2.0, default: -0.5, integer: false },
    ParamSpec::Number { name: "centerY", min: -2.0, max: 2.0, default: 0.0, integer: false },
    ParamSpec::Number { name: "zoomSpeed", min: 0.0, max: 2.0, default: 0.1, integer: false },
]);

/// Mandelbrot set sampled on a coarse preview grid.
#[derive(Debug)]
pub struct Mandelbrot {
    params: Params,
    escape: Vec<u32>,
}

impl Mandelbrot {
    const COLS: usize = 32;
    const ROWS: usize = 18;

    pub fn new() -> Self {
        Self {
            params: MANDELBROT_SCHEMA.defaults(),
            escape: Vec::new(),
        }
    }

    pub fn max_iter(&self) -> u32 {
        number(&self.params, "maxIter") as u32
    }

    /// Iterations before `c = cx + i*cy` escapes, capped at `max_iter`.
    pub fn escape_time(cx: f64, cy: f64, max_iter: u32) -> u32 {
        let (mut x, mut y) = (0.0_f64, 0.0_f64);
        for i in 0..max_iter {
            if x * x + y * y > 4.0 {
                return i;
            }
            let next = x * x - y * y + cx;
            y = 2.0 * x * y + cy;
            x = next;
        }
        max_iter
    }
}

impl Default for Mandelbrot {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for Mandelbrot {
    fn kind(&self) -> &str {
        "mandelbrot"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = MANDELBROT_SCHEMA.resolve(params);
        self.params = resolved;
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        MANDELBROT_SCHEMA.apply(&mut self.params, partial)
    }

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
        let zoom = number(&self.params, "zoom")
            * (1.0 + number(&self.params, "zoomSpeed") * ctx.time_ms / 1000.0);
        let span = 3.0 / zoom;
        let (cx, cy) = (number(&self.params, "centerX"), number(&self.params, "centerY"));
        let max_iter = self.max_iter();
        self.escape.clear();
        for row in 0..Self::ROWS {
            for col in 0..Self::COLS {
                let x = cx + (col as f64 / Self::COLS as f64 - 0.5) * span;
                let y = cy + (row as f64 / Self::ROWS as f64 - 0.5) * span * 9.0 / 16.0;
                self.escape.push(Self::escape_time(x, y, max_iter));
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.escape.clear();
    }

    fn reduce_complexity(&mut self) -> bool {
        let max_iter = self.max_iter();
        if max_iter <= 10 {
            return false;
        }
        self.params.insert("maxIter".into(), (max_iter / 2).max(10).into());
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lissajous_reduction_halves_trail_until_floor() {
        let mut scene = Lissajous::new();
        scene.init(&Params::new()).unwrap();
        assert!(scene.reduce_complexity());
        assert_eq!(scene.trail_len(), DEFAULT_TRAIL / 2);
        while scene.reduce_complexity() {}
        assert_eq!(scene.trail_len(), MIN_TRAIL);
    }

    #[test]
    fn lissajous_reports_clamped_frequency() {
        let mut scene = Lissajous::new();
        let reports = scene.init(&params(json!({ "a": 0.5, "speed": 1.0 }))).unwrap();
        assert_eq!(reports.len(), 1);
        let (x, y) = scene.point_at(0.0);
        assert!(x.abs() < 1e-12 && y.abs() < 1e-12);
    }

    #[test]
    fn roses_reduction_disables_glow_once() {
        let mut scene = PolarRoses::new();
        scene.init(&params(json!({ "k": 0 }))).unwrap();
        assert!(scene.reduce_complexity());
        assert_eq!(scene.glow(), 0.0);
        assert!(!scene.reduce_complexity());
    }

    #[test]
    fn rain_density_halves() {
        let mut scene = DigitsRain::new();
        scene.init(&params(json!({ "density": 0.8, "charset": "e" }))).unwrap();
        let before = scene.column_count();
        assert!(scene.reduce_complexity());
        assert!((scene.density() - 0.4).abs() < 1e-9);
        assert!(scene.column_count() < before);
        assert_eq!(scene.next_digit(), '2');
        assert_eq!(scene.next_digit(), '7');
    }

    #[test]
    fn life_blinker_oscillates() {
        let mut scene = ConwayLife::new();
        scene.init(&params(json!({ "cellSize": 20 }))).unwrap();
        scene.cells.iter_mut().for_each(|cell| *cell = false);
        let (w, _) = scene.grid();
        for x in 4..7 {
            scene.cells[5 * w + x] = true;
        }
        scene.step();
        assert!(scene.cells[4 * w + 5] && scene.cells[5 * w + 5] && scene.cells[6 * w + 5]);
        assert!(!scene.cells[5 * w + 4]);
        scene.step();
        assert!(scene.cells[5 * w + 4] && scene.cells[5 * w + 6]);
        assert_eq!(scene.alive(), 3);
    }

    #[test]
    fn life_steps_on_step_interval_and_enlarges_cells() {
        let mut scene = ConwayLife::new();
        scene.init(&params(json!({ "stepMs": 100, "cellSize": 8 }))).unwrap();
        for _ in 0..10 {
            scene.render(&FrameContext::new(0.0, 25.0, 1.0)).unwrap();
        }
        assert_eq!(scene.generation(), 2);

        assert!(scene.reduce_complexity());
        assert_eq!(scene.cell_size(), 16);
        assert!(scene.reduce_complexity());
        assert_eq!(scene.cell_size(), 20);
        assert!(!scene.reduce_complexity());
    }

    #[test]
    fn mandelbrot_iterations_halve_to_floor() {
        let mut scene = Mandelbrot::new();
        scene.init(&params(json!({ "maxIter": 40 }))).unwrap();
        assert!(scene.reduce_complexity());
        assert_eq!(scene.max_iter(), 20);
        assert!(scene.reduce_complexity());
        assert_eq!(scene.max_iter(), 10);
        assert!(!scene.reduce_complexity());
        scene.render(&FrameContext::new(500.0, 16.0, 1.0)).unwrap();
    }

    #[test]
    fn mandelbrot_escape_time() {
        assert_eq!(Mandelbrot::escape_time(0.0, 0.0, 50), 50);
        assert!(Mandelbrot::escape_time(2.0, 2.0, 50) < 3);
    }
}
