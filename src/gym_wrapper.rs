//! Bridge to the Python sword environment.
//!
//! The Python module must expose `make_env()`, returning the extended sword
//! environment whose `reset(lstm_state)` and `step(action, lstm_state)` return
//! an `[observation, lstm_state]` pair. The recurrent state lives on the Rust
//! side, so `None` is passed through the state slot and only the observation
//! is read back.

use pyo3::prelude::*;

use crate::environment::{Action, Environment, NUM_ACTIONS, OBSERVATION_LEN, Observation, Step};
use crate::error::Result;

pub struct GymEnvironment {
    env: PyObject,
}

impl GymEnvironment {
    pub fn new(module: &str) -> Result<Self> {
        let env = Python::with_gil(|py| -> PyResult<PyObject> {
            let module = py.import_bound(module)?;
            Ok(module.call_method0("make_env")?.unbind())
        })?;
        log::info!("Created sword environment from Python module {module}");
        Ok(Self { env })
    }

    fn observation_of(pair: &Bound<'_, PyAny>) -> PyResult<Observation> {
        let features: Vec<f32> = pair.get_item(0)?.call_method0("tolist")?.extract()?;
        Ok(Observation::new(features))
    }
}

impl Environment for GymEnvironment {
    fn observation_len(&self) -> usize {
        OBSERVATION_LEN
    }

    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }

    fn reset(&mut self) -> Result<Observation> {
        let observation = Python::with_gil(|py| -> PyResult<Observation> {
            let pair = self.env.bind(py).call_method1("reset", (py.None(),))?;
            Self::observation_of(&pair)
        })?;
        observation.check_len(OBSERVATION_LEN)?;
        Ok(observation)
    }

    fn step(&mut self, action: Action) -> Result<Step> {
        let step = Python::with_gil(|py| -> PyResult<Step> {
            let result_tuple = self
                .env
                .bind(py)
                .call_method1("step", (action.index(), py.None()))?;

            let observation = Self::observation_of(&result_tuple.get_item(0)?)?;
            let reward: f32 = result_tuple.get_item(1)?.extract()?;
            let done: bool = result_tuple.get_item(2)?.extract()?;

            Ok(Step {
                observation,
                reward,
                done,
            })
        })?;
        step.observation.check_len(OBSERVATION_LEN)?;
        Ok(step)
    }

    fn opponent_health(&self) -> Option<f32> {
        Python::with_gil(|py| {
            self.env
                .bind(py)
                .call_method0("npc_hp")
                .and_then(|hp| hp.extract::<f32>())
                .map_err(|e| log::warn!("Reading npc_hp failed: {e}"))
                .ok()
        })
    }

    fn render(&mut self) -> Result<()> {
        Python::with_gil(|py| -> PyResult<()> {
            self.env.bind(py).call_method0("render")?;
            Ok(())
        })?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Python::with_gil(|py| -> PyResult<()> {
            self.env.bind(py).call_method0("close")?;
            Ok(())
        })?;
        Ok(())
    }
}
