use hummingbird_core::agent::{ManualInput, ACTION_SIZE};
use hummingbird_core::area::AreaLayout;
use hummingbird_core::config::SimConfig;
use hummingbird_core::env::Environment;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

#[pyfunction]
fn version() -> &'static str {
    "0.1.0"
}

/// One flower area with one hummingbird, stepped by an external learner.
///
/// `config_json` and `layout_json` are optional JSON documents; without a
/// layout a procedural ring of plants is generated from the config seed.
#[pyclass(unsendable)]
struct HummingbirdEnv {
    inner: Environment,
}

#[pymethods]
impl HummingbirdEnv {
    #[new]
    #[pyo3(signature = (config_json=None, layout_json=None, plants=5, flowers_per_plant=3))]
    fn new(
        config_json: Option<&str>,
        layout_json: Option<&str>,
        plants: usize,
        flowers_per_plant: usize,
    ) -> PyResult<Self> {
        let config: SimConfig = match config_json {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| PyValueError::new_err(format!("invalid config: {e}")))?,
            None => SimConfig::default(),
        };
        let layout: AreaLayout = match layout_json {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| PyValueError::new_err(format!("invalid layout: {e}")))?,
            None => AreaLayout::procedural(
                &mut ChaCha12Rng::seed_from_u64(config.seed),
                plants,
                flowers_per_plant,
            ),
        };
        let inner =
            Environment::try_new(config, layout).map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Starts a new episode and returns the first observation.
    fn reset(&mut self) -> PyResult<Vec<f32>> {
        self.inner
            .try_reset()
            .map(|obs| obs.to_vec())
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Returns `(observation, reward, done, interrupted)`.
    fn step(&mut self, action: Vec<f32>) -> PyResult<(Vec<f32>, f32, bool, bool)> {
        let action: [f32; ACTION_SIZE] = action.try_into().map_err(|v: Vec<f32>| {
            PyValueError::new_err(format!(
                "expected {ACTION_SIZE} action values, got {}",
                v.len()
            ))
        })?;
        let result = self.inner.step(&action);
        Ok((
            result.observation.to_vec(),
            result.reward,
            result.done,
            result.interrupted,
        ))
    }

    fn observation(&self) -> Vec<f32> {
        self.inner.observation().to_vec()
    }

    /// Action for held keys, for manual play.
    #[allow(clippy::too_many_arguments)]
    #[pyo3(signature = (
        forward=false, backward=false, left=false, right=false, down=false, up=false,
        pitch_down=false, pitch_up=false, turn_left=false, turn_right=false
    ))]
    fn heuristic(
        &self,
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
        down: bool,
        up: bool,
        pitch_down: bool,
        pitch_up: bool,
        turn_left: bool,
        turn_right: bool,
    ) -> Vec<f32> {
        let input = ManualInput {
            forward,
            backward,
            left,
            right,
            down,
            up,
            pitch_down,
            pitch_up,
            turn_left,
            turn_right,
        };
        self.inner.heuristic(&input).to_vec()
    }

    #[getter]
    fn step_count(&self) -> u32 {
        self.inner.step_count()
    }

    #[getter]
    fn nectar_obtained(&self) -> f32 {
        self.inner.agent().nectar_obtained()
    }

    #[getter]
    fn cumulative_reward(&self) -> f32 {
        self.inner.agent().cumulative_reward()
    }

    #[getter]
    fn flower_count(&self) -> usize {
        self.inner.area().flowers().len()
    }

    fn config_json(&self) -> PyResult<String> {
        serde_json::to_string(self.inner.config())
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_class::<HummingbirdEnv>()?;
    Ok(())
}
