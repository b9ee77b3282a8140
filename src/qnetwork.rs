use tch::{
    Tensor,
    nn::{self, Module, RNN},
};

use crate::config::AgentConfig;

/// Q-function with temporal memory: a single LSTM layer followed by a small
/// fully connected head producing one Q-value per action.
pub struct RecurrentQNetwork {
    lstm: nn::LSTM,
    head: nn::Sequential,
    lstm_size: i64,
}

impl RecurrentQNetwork {
    pub fn new(vs: &nn::Path, config: &AgentConfig) -> Self {
        let lstm_size = config.lstm_size as i64;
        let lstm = nn::lstm(
            vs / "lstm",
            config.observation_len as i64,
            lstm_size,
            Default::default(),
        );

        let mut head = nn::seq();
        let mut width = lstm_size;
        for (i, &hidden) in config.hidden_layers.iter().enumerate() {
            head = head
                .add(nn::linear(
                    vs / format!("hidden{i}"),
                    width,
                    hidden as i64,
                    Default::default(),
                ))
                .add_fn(|xs| xs.relu());
            width = hidden as i64;
        }
        head = head.add(nn::linear(
            vs / "q_values",
            width,
            config.num_actions as i64,
            Default::default(),
        ));

        Self {
            lstm,
            head,
            lstm_size,
        }
    }

    /// Runs one timestep for every row of the batch.
    ///
    /// `observations` is `[batch, observation_len]`; `state` holds `[1, batch, lstm_size]`
    /// tensors. Returns Q-values `[batch, num_actions]` and the next state.
    pub fn forward(&self, observations: &Tensor, state: &nn::LSTMState) -> (Tensor, nn::LSTMState) {
        // time dimension of length 1
        let (output, next_state) = self.lstm.seq_init(&observations.unsqueeze(1), state);
        let features = output.view([-1, self.lstm_size]);
        (self.head.forward(&features), next_state)
    }
}
