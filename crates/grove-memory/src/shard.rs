//! One user's slice of the engine: an episodic store and a semantic store
//! that are always locked together.

use crate::episodic::EpisodicStore;
use crate::retrieval::Retriever;
use crate::semantic::SemanticStore;

#[derive(Debug, Default)]
pub struct UserMemory {
    pub episodic: EpisodicStore,
    pub semantic: SemanticStore,
}

impl UserMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retriever(&mut self) -> Retriever<'_> {
        Retriever::new(&mut self.episodic, &mut self.semantic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episodic::NewEpisode;

    #[test]
    fn retriever_sees_shard_contents() {
        let mut shard = UserMemory::new();
        shard
            .episodic
            .create(NewEpisode::new("u1", "Morning run", "5k along the river"))
            .unwrap();
        let recent = shard.retriever().recent("u1", 1, 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(shard.episodic.peek(&recent[0].id).unwrap().access_count, 2);
    }
}
