//! Concurrent registration for one target never exposes a partial binding

use std::sync::Arc;

use forge_artifact::{ArtifactSource, Target};
use forge_codegen::InterfaceContract;
use forge_runtime::{ArtifactOrigin, ArtifactRegistry, PythonLoader};

fn variant(i: usize) -> ArtifactSource {
    ArtifactSource::new(format!("VERSION = {i}\n\ndef parse(pdf_path):\n    return []\n"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_writer_wins_and_every_read_is_whole() {
    let registry = Arc::new(ArtifactRegistry::new(Arc::new(PythonLoader::new(
        "python3",
        InterfaceContract::default(),
    ))));
    let target = Target::new("sbi").unwrap();
    let sources: Vec<ArtifactSource> = (0..32).map(variant).collect();

    let writers = sources.iter().cloned().map(|source| {
        let registry = Arc::clone(&registry);
        let target = target.clone();
        tokio::spawn(async move {
            registry
                .register(&target, &source, ArtifactOrigin::Generated)
                .map(|handle| handle.revision())
        })
    });
    let readers = (0..32).map(|_| {
        let registry = Arc::clone(&registry);
        let target = target.clone();
        tokio::spawn(async move { registry.lookup(&target).ok().map(|h| h.digest()) })
    });

    let written = futures::future::join_all(writers).await;
    let read = futures::future::join_all(readers).await;

    let digests: Vec<_> = sources.iter().map(ArtifactSource::digest).collect();
    for seen in read.into_iter().map(Result::unwrap).flatten() {
        assert!(digests.contains(&seen), "reader saw an unknown binding");
    }

    // the surviving binding is the one with the highest revision
    let revisions: Vec<u64> = written.into_iter().map(|r| r.unwrap().unwrap()).collect();
    let max = *revisions.iter().max().unwrap();
    let current = registry.lookup(&target).unwrap();
    assert_eq!(current.revision(), max);
    assert!(digests.contains(&current.digest()));
    assert_eq!(registry.len(), 1);
}
