//! Bake job controller: upload, clear, dispatch, wait, read back.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::atlas::Atlas;
use crate::config::BakeConfig;
use crate::contribution::Contribution;
use crate::dispatch::{PreparedScene, Strategy};
use crate::error::{BakeError, Result};
use crate::vertex::VertexStore;

/// Lifecycle of one bake. `Complete` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BakeState {
    Idle,
    VertexUploaded,
    Dispatched,
    Synchronizing,
    Complete,
    Failed,
}

/// Summary of a finished dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct BakeReport {
    pub strategy: Strategy,
    pub triangles: usize,
    pub degenerate_triangles: usize,
    pub covered_texels: usize,
    pub elapsed: Duration,
}

/// One vertex store, one atlas, one dispatch.
#[derive(Debug)]
pub struct BakeJob {
    config: BakeConfig,
    state: BakeState,
    store: Option<VertexStore>,
    atlas: Option<Atlas>,
    report: Option<BakeReport>,
}

impl BakeJob {
    pub fn new(config: BakeConfig) -> Self {
        Self {
            config,
            state: BakeState::Idle,
            store: None,
            atlas: None,
            report: None,
        }
    }

    #[inline]
    pub fn state(&self) -> BakeState {
        self.state
    }

    pub fn config(&self) -> &BakeConfig {
        &self.config
    }

    pub fn report(&self) -> Option<&BakeReport> {
        self.report.as_ref()
    }

    fn transition(&mut self, next: BakeState) {
        debug!("bake job: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: BakeError) -> BakeError {
        warn!("bake job failed in {:?}: {}", self.state, err);
        self.state = BakeState::Failed;
        err
    }

    fn expect_state(&self, expected: BakeState, action: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BakeError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    /// Take ownership of an already validated vertex store.
    pub fn upload(&mut self, store: VertexStore) -> Result<()> {
        self.expect_state(BakeState::Idle, "upload vertices")?;

        debug!(
            "uploaded {} vertices ({} triangles, {:?})",
            store.vertex_count(),
            store.triangle_count(),
            store.layout()
        );
        self.store = Some(store);
        self.transition(BakeState::VertexUploaded);
        Ok(())
    }

    /// Bind a raw record buffer with its stride and declared vertex count.
    pub fn upload_bytes(
        &mut self,
        bytes: &[u8],
        stride: usize,
        declared_vertex_count: usize,
    ) -> Result<()> {
        self.expect_state(BakeState::Idle, "upload vertices")?;

        match VertexStore::from_bytes(bytes, stride, declared_vertex_count) {
            Ok(store) => self.upload(store),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Bind a caller-owned output atlas instead of allocating one. It must
    /// match the configured resolution and baseline, and is cleared at
    /// dispatch.
    pub fn bind_atlas(&mut self, atlas: Atlas) -> Result<()> {
        if matches!(self.state, BakeState::Complete | BakeState::Failed) {
            return Err(BakeError::InvalidState {
                action: "bind an atlas",
                state: self.state,
            });
        }

        if (atlas.width(), atlas.height()) != (self.config.atlas_width, self.config.atlas_height) {
            let err = BakeError::binding(format!(
                "atlas bound at {}x{}, job configured for {}x{}",
                atlas.width(),
                atlas.height(),
                self.config.atlas_width,
                self.config.atlas_height
            ));
            return Err(self.fail(err));
        }

        if atlas.baseline() != self.config.baseline {
            let err = BakeError::binding(format!(
                "atlas bound with baseline {:?}, job configured for {:?}",
                atlas.baseline(),
                self.config.baseline
            ));
            return Err(self.fail(err));
        }

        self.atlas = Some(atlas);
        Ok(())
    }

    /// Validate, clear the atlas, launch `strategy` and block until every
    /// task has returned.
    pub fn dispatch(&mut self, strategy: Strategy, contribution: &Contribution) -> Result<&BakeReport> {
        self.expect_state(BakeState::VertexUploaded, "dispatch")?;

        let scene = match self.validate(contribution) {
            Ok(scene) => scene,
            Err(e) => return Err(self.fail(e)),
        };

        let mut atlas = self
            .atlas
            .take()
            .unwrap_or_else(|| Atlas::for_config(&self.config));
        atlas.clear();

        let dispatcher = strategy.dispatcher(self.config.accumulation);
        let start = Instant::now();

        self.transition(BakeState::Dispatched);
        debug!(
            "launching {} over {} triangles into {}x{} (batch {}, {:?})",
            dispatcher.strategy(),
            scene.triangle_count(),
            atlas.width(),
            atlas.height(),
            self.config.batch_size,
            self.config.accumulation
        );

        // The dispatch call only returns once all tasks are done.
        self.transition(BakeState::Synchronizing);
        dispatcher.dispatch(&scene, &mut atlas, self.config.batch_size);

        let report = BakeReport {
            strategy,
            triangles: scene.triangle_count(),
            degenerate_triangles: scene.degenerate_count(),
            covered_texels: atlas.covered_texels(),
            elapsed: start.elapsed(),
        };

        info!(
            "{} bake: {} triangles ({} degenerate), {} of {} texels covered in {:.2?}",
            strategy,
            report.triangles,
            report.degenerate_triangles,
            report.covered_texels,
            atlas.len(),
            report.elapsed
        );

        self.atlas = Some(atlas);
        self.transition(BakeState::Complete);
        Ok(&*self.report.insert(report))
    }

    fn validate(&self, contribution: &Contribution) -> Result<PreparedScene> {
        self.config.validate()?;

        if let Some(atlas) = self.atlas.as_ref() {
            if atlas.len() != self.config.texel_count() {
                return Err(BakeError::binding("bound atlas size changed since binding"));
            }
        }

        let store = self
            .store
            .as_ref()
            .ok_or_else(|| BakeError::binding("no vertex store bound"))?;

        PreparedScene::prepare(store, contribution)
    }

    /// The finished atlas. Only available after the completion barrier.
    pub fn read_back(&self) -> Result<&Atlas> {
        self.expect_state(BakeState::Complete, "read back")?;
        self.atlas.as_ref().ok_or(BakeError::InvalidState {
            action: "read back",
            state: self.state,
        })
    }

    pub fn into_atlas(mut self) -> Result<Atlas> {
        self.expect_state(BakeState::Complete, "read back")?;
        self.atlas.take().ok_or(BakeError::InvalidState {
            action: "read back",
            state: self.state,
        })
    }
}

/// Upload, dispatch and read back in one call.
pub fn bake(
    config: &BakeConfig,
    store: VertexStore,
    strategy: Strategy,
    contribution: &Contribution,
) -> Result<(Atlas, BakeReport)> {
    let mut job = BakeJob::new(config.clone());
    job.upload(store)?;
    let report = job.dispatch(strategy, contribution)?.clone();
    Ok((job.into_atlas()?, report))
}

/// Outcome of baking the same scene with both strategies.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossValidation {
    pub texel_driven: BakeReport,
    pub triangle_driven: BakeReport,
    /// Texels covered by exactly one of the two bakes.
    pub mask_mismatches: usize,
    /// Largest per-channel difference between the two atlases.
    pub max_abs_diff: f32,
}

impl CrossValidation {
    pub fn agrees(&self) -> bool {
        self.mask_mismatches == 0
    }
}

/// Bake with the texel-driven and the triangle-driven pass and compare.
pub fn cross_validate(
    config: &BakeConfig,
    store: &VertexStore,
    contribution: &Contribution,
) -> Result<CrossValidation> {
    let (by_texel, texel_report) = bake(config, store.clone(), Strategy::TexelDriven, contribution)?;
    let (by_triangle, triangle_report) =
        bake(config, store.clone(), Strategy::TriangleDriven, contribution)?;

    let mask_mismatches = by_texel
        .coverage()
        .iter()
        .zip(by_triangle.coverage())
        .filter(|(a, b)| (**a > 0) != (**b > 0))
        .count();

    let max_abs_diff = by_texel
        .texels()
        .iter()
        .flatten()
        .zip(by_triangle.texels().iter().flatten())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);

    if mask_mismatches != 0 {
        warn!(
            "cross-validation: {} texels disagree between passes",
            mask_mismatches
        );
    }

    Ok(CrossValidation {
        texel_driven: texel_report,
        triangle_driven: triangle_report,
        mask_mismatches,
        max_abs_diff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccumulationMode;
    use crate::vertex::Vertex;
    use glam::Vec2;
    use lmap::encode_records;

    fn triangle_store() -> VertexStore {
        VertexStore::from_vertices(vec![
            Vertex::at_light_uv(Vec2::new(0.0, 0.0)),
            Vertex::at_light_uv(Vec2::new(1.0, 0.0)),
            Vertex::at_light_uv(Vec2::new(0.0, 1.0)),
        ])
        .unwrap()
    }

    fn small_config() -> BakeConfig {
        BakeConfig {
            batch_size: 2,
            ..BakeConfig::with_resolution(4, 4)
        }
    }

    #[test]
    fn happy_path_walks_every_state() {
        let mut job = BakeJob::new(small_config());
        assert_eq!(job.state(), BakeState::Idle);

        job.upload(triangle_store()).unwrap();
        assert_eq!(job.state(), BakeState::VertexUploaded);

        let report = job
            .dispatch(Strategy::TriangleDriven, &Contribution::default())
            .unwrap();
        assert_eq!(report.covered_texels, 10);
        assert_eq!(job.state(), BakeState::Complete);

        let atlas = job.read_back().unwrap();
        assert_eq!(atlas.texel(0, 0), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn read_back_before_completion_is_refused() {
        let mut job = BakeJob::new(small_config());
        job.upload(triangle_store()).unwrap();
        assert!(matches!(
            job.read_back(),
            Err(BakeError::InvalidState {
                state: BakeState::VertexUploaded,
                ..
            })
        ));
        // A refused call leaves the state alone.
        assert_eq!(job.state(), BakeState::VertexUploaded);
    }

    #[test]
    fn dispatch_without_upload_is_refused() {
        let mut job = BakeJob::new(small_config());
        let err = job
            .dispatch(Strategy::TexelDriven, &Contribution::default())
            .unwrap_err();
        assert!(matches!(err, BakeError::InvalidState { .. }));
        assert_eq!(job.state(), BakeState::Idle);
    }

    #[test]
    fn bad_vertex_count_fails_the_job() {
        let bytes = encode_records(&triangle_store().to_records()).unwrap();
        let mut job = BakeJob::new(small_config());

        let err = job.upload_bytes(&bytes, 40, 6).unwrap_err();
        assert!(matches!(err, BakeError::Configuration(_)));
        assert_eq!(job.state(), BakeState::Failed);

        // Failed is terminal.
        assert!(job.upload(triangle_store()).is_err());
    }

    #[test]
    fn out_of_range_light_uv_fails_instead_of_dispatching() {
        let store = VertexStore::from_vertices(vec![
            Vertex::at_light_uv(Vec2::new(0.0, 0.0)),
            Vertex::at_light_uv(Vec2::new(2.0, 0.0)),
            Vertex::at_light_uv(Vec2::new(0.0, 1.0)),
        ])
        .unwrap();

        let mut job = BakeJob::new(small_config());
        job.upload(store).unwrap();
        assert!(job
            .dispatch(Strategy::TexelDriven, &Contribution::default())
            .is_err());
        assert_eq!(job.state(), BakeState::Failed);
        assert!(job.report().is_none());
    }

    #[test]
    fn mismatched_atlas_binding_fails() {
        let mut job = BakeJob::new(small_config());
        let err = job
            .bind_atlas(Atlas::new(8, 8, [0.0, 0.0, 0.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, BakeError::ResourceBinding(_)));
        assert_eq!(job.state(), BakeState::Failed);
    }

    #[test]
    fn bound_atlas_is_cleared_before_dispatch() {
        let mut stale = Atlas::new(4, 4, [0.0, 0.0, 0.0, 1.0]);
        stale.texels[15] = [9.0, 9.0, 9.0, 1.0];
        stale.coverage[15] = 3;

        let mut job = BakeJob::new(small_config());
        job.bind_atlas(stale).unwrap();
        job.upload(triangle_store()).unwrap();
        job.dispatch(Strategy::TexelDriven, &Contribution::default())
            .unwrap();

        let atlas = job.into_atlas().unwrap();
        assert_eq!(atlas.texel(3, 3), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(atlas.coverage_at(3, 3), 0);
    }

    #[test]
    fn bound_atlas_must_share_the_configured_baseline() {
        let config = BakeConfig {
            baseline: [0.5, 0.5, 0.5, 1.0],
            ..small_config()
        };
        let mut job = BakeJob::new(config);
        let err = job
            .bind_atlas(Atlas::new(4, 4, [0.0, 0.0, 0.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, BakeError::ResourceBinding(_)));
        assert_eq!(job.state(), BakeState::Failed);
    }

    #[test]
    fn matching_bound_atlas_is_cleared_to_the_configured_baseline() {
        let baseline = [0.5, 0.5, 0.5, 1.0];
        let config = BakeConfig {
            baseline,
            ..small_config()
        };
        let mut stale = Atlas::new(4, 4, baseline);
        stale.texels[15] = [9.0, 9.0, 9.0, 1.0];

        let mut job = BakeJob::new(config);
        job.bind_atlas(stale).unwrap();
        job.upload(triangle_store()).unwrap();
        job.dispatch(Strategy::TexelDriven, &Contribution::default())
            .unwrap();

        let atlas = job.read_back().unwrap();
        assert_eq!(atlas.texel(3, 3), baseline);
        assert_eq!(atlas.texel(0, 0), [1.5, 1.5, 1.5, 1.0]);
    }

    #[test]
    fn completed_job_rejects_another_upload_or_dispatch() {
        let mut job = BakeJob::new(small_config());
        job.upload(triangle_store()).unwrap();
        job.dispatch(Strategy::TriangleDriven, &Contribution::default())
            .unwrap();
        assert_eq!(job.state(), BakeState::Complete);

        let err = job
            .dispatch(Strategy::TexelDriven, &Contribution::default())
            .unwrap_err();
        assert!(matches!(
            err,
            BakeError::InvalidState {
                state: BakeState::Complete,
                ..
            }
        ));
        assert_eq!(job.state(), BakeState::Complete);

        let err = job.upload(triangle_store()).unwrap_err();
        assert!(matches!(
            err,
            BakeError::InvalidState {
                state: BakeState::Complete,
                ..
            }
        ));
        assert_eq!(job.state(), BakeState::Complete);

        // The finished atlas is still readable.
        assert!(job.read_back().is_ok());
    }

    #[test]
    fn zero_batch_size_is_a_configuration_failure() {
        let config = BakeConfig {
            batch_size: 0,
            ..small_config()
        };
        let mut job = BakeJob::new(config);
        job.upload(triangle_store()).unwrap();
        let err = job
            .dispatch(Strategy::TriangleDriven, &Contribution::default())
            .unwrap_err();
        assert!(matches!(err, BakeError::Configuration(_)));
        assert_eq!(job.state(), BakeState::Failed);
    }

    #[test]
    fn both_accumulation_modes_cross_validate() {
        for accumulation in [AccumulationMode::Atomic, AccumulationMode::ScatterResolve] {
            let config = BakeConfig {
                accumulation,
                ..BakeConfig::with_resolution(32, 32)
            };
            let result =
                cross_validate(&config, &triangle_store(), &Contribution::default()).unwrap();
            assert!(result.agrees());
            assert_eq!(result.max_abs_diff, 0.0);
            assert_eq!(
                result.texel_driven.covered_texels,
                result.triangle_driven.covered_texels
            );
        }
    }
}
