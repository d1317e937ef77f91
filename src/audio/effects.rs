use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    FeedbackDelay,
    Distortion,
    Reverb,
    Tremolo,
    AutoFilter,
}

/// Descriptor of one effect stage. The DSP behind a stage is external; the
/// chain only owns ordering and identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub id: String,
    pub kind: EffectKind,
}

impl Effect {
    pub fn new(id: impl Into<String>, kind: EffectKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Ordered effect chain between a voice and its track channel. Newly added
/// effects are inserted at the head.
#[derive(Debug, Default)]
pub struct EffectsChain {
    effects: Vec<Effect>,
    generation: u64,
}

impl EffectsChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Monotonic counter bumped on every mutation; a changed generation
    /// obliges a full routing rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn add_effect(&mut self, effect: Effect) {
        self.effects.insert(0, effect);
        self.generation += 1;
    }

    pub fn remove_effect(&mut self, id: &str) {
        self.effects.retain(|e| e.id != id);
        self.generation += 1;
    }
}

/// One node in the rebuilt signal path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingNode {
    Voice,
    Effect(String),
    Channel,
    Master,
}

/// The complete signal path for one instrument. Rebuilt whole on every chain
/// mutation: effect stages do not cleanly bypass when hot-swapped, so
/// partial reconnection is disallowed.
pub fn build_routing(chain: &EffectsChain) -> Vec<RoutingNode> {
    let mut nodes = Vec::with_capacity(chain.effects.len() + 3);
    nodes.push(RoutingNode::Voice);
    nodes.extend(
        chain
            .effects
            .iter()
            .map(|effect| RoutingNode::Effect(effect.id.clone())),
    );
    nodes.push(RoutingNode::Channel);
    nodes.push(RoutingNode::Master);
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_effects_are_prepended() {
        let mut chain = EffectsChain::new();
        chain.add_effect(Effect::new("delay", EffectKind::FeedbackDelay));
        chain.add_effect(Effect::new("dist", EffectKind::Distortion));

        let ids: Vec<&str> = chain.effects().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["dist", "delay"]);
    }

    #[test]
    fn remove_by_id() {
        let mut chain = EffectsChain::new();
        chain.add_effect(Effect::new("delay", EffectKind::FeedbackDelay));
        chain.add_effect(Effect::new("dist", EffectKind::Distortion));
        chain.remove_effect("delay");

        let ids: Vec<&str> = chain.effects().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["dist"]);
    }

    #[test]
    fn every_mutation_bumps_generation() {
        let mut chain = EffectsChain::new();
        assert_eq!(chain.generation(), 0);

        chain.add_effect(Effect::new("delay", EffectKind::FeedbackDelay));
        assert_eq!(chain.generation(), 1);

        // Removing an unknown id still counts as a mutation, and still
        // forces dependents to reconnect.
        chain.remove_effect("nope");
        assert_eq!(chain.generation(), 2);
    }

    #[test]
    fn routing_runs_voice_through_chain_to_master() {
        let mut chain = EffectsChain::new();
        chain.add_effect(Effect::new("delay", EffectKind::FeedbackDelay));
        chain.add_effect(Effect::new("dist", EffectKind::Distortion));

        assert_eq!(
            build_routing(&chain),
            vec![
                RoutingNode::Voice,
                RoutingNode::Effect("dist".into()),
                RoutingNode::Effect("delay".into()),
                RoutingNode::Channel,
                RoutingNode::Master,
            ]
        );
    }

    #[test]
    fn empty_chain_still_reaches_channel_and_master() {
        let chain = EffectsChain::new();
        assert_eq!(
            build_routing(&chain),
            vec![RoutingNode::Voice, RoutingNode::Channel, RoutingNode::Master]
        );
    }
}
