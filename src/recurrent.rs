use tch::{Device, Tensor, nn};

use crate::error::{DrqnError, Result};

/// Cell and hidden state of the LSTM, carried from one timestep to the next.
///
/// The agent hands the state back with every action; the caller feeds it into
/// the next call and stores both ends of each step in the replay buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmState {
    pub c: Vec<f32>,
    pub h: Vec<f32>,
}

impl LstmState {
    /// State at the start of an episode.
    pub fn zeros(lstm_size: usize) -> Self {
        Self {
            c: vec![0.0; lstm_size],
            h: vec![0.0; lstm_size],
        }
    }

    pub fn size(&self) -> usize {
        self.h.len()
    }

    fn check_size(&self, expected: usize) -> Result<()> {
        if self.c.len() != expected || self.h.len() != expected {
            return Err(DrqnError::LstmStateSize {
                expected,
                found: self.c.len().max(self.h.len()),
            });
        }
        Ok(())
    }

    /// Packs states into the `[1, batch, size]` layout `tch` expects for a
    /// single-layer LSTM.
    pub fn stack(states: &[&LstmState], lstm_size: usize, device: Device) -> Result<nn::LSTMState> {
        if states.is_empty() {
            return Err(DrqnError::EmptyBatch);
        }
        let mut h = Vec::with_capacity(states.len() * lstm_size);
        let mut c = Vec::with_capacity(states.len() * lstm_size);
        for state in states {
            state.check_size(lstm_size)?;
            h.extend_from_slice(&state.h);
            c.extend_from_slice(&state.c);
        }
        let shape = [1, states.len() as i64, lstm_size as i64];
        let h = Tensor::from_slice(&h).view(shape).to(device);
        let c = Tensor::from_slice(&c).view(shape).to(device);
        Ok(nn::LSTMState((h, c)))
    }

    /// Extracts batch row `row` of a packed state.
    pub fn unstack(state: &nn::LSTMState, row: usize) -> Result<Self> {
        let row = row as i64;
        let h = state.h().get(0).get(row).to(Device::Cpu);
        let c = state.c().get(0).get(row).to(Device::Cpu);
        Ok(Self {
            c: Vec::<f32>::try_from(&c).map_err(DrqnError::torch("reading LSTM cell state"))?,
            h: Vec::<f32>::try_from(&h).map_err(DrqnError::torch("reading LSTM hidden state"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_has_both_components() {
        let state = LstmState::zeros(5);
        assert_eq!(state.c, vec![0.0; 5]);
        assert_eq!(state.h, vec![0.0; 5]);
        assert_eq!(state.size(), 5);
    }

    #[test]
    fn stack_layout_and_unstack_row() {
        let a = LstmState { c: vec![1.0, 2.0], h: vec![3.0, 4.0] };
        let b = LstmState { c: vec![5.0, 6.0], h: vec![7.0, 8.0] };
        let packed = LstmState::stack(&[&a, &b], 2, Device::Cpu).unwrap();
        assert_eq!(packed.h().size(), vec![1, 2, 2]);
        assert_eq!(packed.c().size(), vec![1, 2, 2]);
        assert_eq!(LstmState::unstack(&packed, 1).unwrap(), b);
        assert_eq!(LstmState::unstack(&packed, 0).unwrap(), a);
    }

    #[test]
    fn stack_rejects_wrong_size() {
        let state = LstmState::zeros(3);
        assert!(matches!(
            LstmState::stack(&[&state], 4, Device::Cpu),
            Err(DrqnError::LstmStateSize { expected: 4, found: 3 })
        ));
    }

    #[test]
    fn stack_rejects_empty_batch() {
        assert!(matches!(
            LstmState::stack(&[], 4, Device::Cpu),
            Err(DrqnError::EmptyBatch)
        ));
    }
}
