/// A class index paired with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelScore {
    pub index: usize,
    pub score: f32,
}

/// One step of classification postprocessing: transforms, orders or
/// filters the scores of a single row.
pub trait ScoreStage: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, scores: &mut Vec<LabelScore>);
}

/// Composes stages into the per-row postprocessing of a classifier.
#[derive(Default)]
pub struct ScoreChain {
    stages: Vec<Box<dyn ScoreStage>>,
}

impl ScoreChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage to the end of the chain.
    pub fn with(mut self, stage: Box<dyn ScoreStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stage names in application order.
    pub fn stages(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage over one row of raw outputs (index = class id).
    pub fn run(&self, logits: &[f32]) -> Vec<LabelScore> {
        let mut scores: Vec<LabelScore> = logits
            .iter()
            .enumerate()
            .map(|(index, &score)| LabelScore { index, score })
            .collect();
        for stage in &self.stages {
            stage.apply(&mut scores);
        }
        scores
    }
}

impl std::fmt::Debug for ScoreChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.stages()).finish()
    }
}
