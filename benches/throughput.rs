use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use panrouter::dispatcher::{HandlerRequest, HandlerResponse};
use panrouter::router::Router;
use panrouter::template::PathTemplate;
use std::hint::black_box;

fn ok(_req: &mut HandlerRequest, _res: &mut HandlerResponse) -> anyhow::Result<()> {
    Ok(())
}

fn build_router() -> Router {
    let mut router = Router::new();
    router.get("/", ok).expect("root");
    router
        .mount("/zoo", |r| {
            r.get("/animals", ok)?;
            r.post("/animals", ok)?;
            r.get("/animals/{id}", ok)?;
            r.put("/animals/{id}", ok)?;
            r.delete("/animals/{id}", ok)?;
            r.get("/animals/{id}/toys/{toy_id}", ok)?;
            r.get(
                "/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}",
                ok,
            )?;
            Ok(())
        })
        .expect("zoo routes");
    router
        .post(
            "/inventory/{warehouse_id}/feeds/{feed_id}/items/{item_id}/batches/{batch_id}",
            ok,
        )
        .expect("inventory route");
    router
        .filter("/zoo", |req: &mut HandlerRequest, _res: &mut HandlerResponse| {
            req.set_attribute("zone", "zoo");
            Ok(())
        })
        .expect("zoo filter");
    router
}

fn bench_template_match(c: &mut Criterion) {
    let template = PathTemplate::compile(
        "/zoo/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}",
    )
    .expect("pattern");
    c.bench_function("template_match", |b| {
        b.iter(|| black_box(template.matches(black_box("/zoo/cats/animals/123/habitats/88/sections/5"))))
    });
    c.bench_function("template_extract", |b| {
        b.iter(|| black_box(template.extract(black_box("/zoo/cats/animals/123/habitats/88/sections/5"))))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let (dispatcher, _upgrades) = build_router().build();
    let test_paths = [
        (Method::GET, "/zoo/animals/123"),
        (Method::GET, "/zoo/animals/123/toys/456"),
        (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
        (Method::POST, "/inventory/1/feeds/2/items/3/batches/4"),
        (Method::GET, "/complex/1/2/3/4/5/6/7/8/9"),
    ];
    c.bench_function("dispatch", |b| {
        b.iter(|| {
            for (method, path) in &test_paths {
                let mut req = HandlerRequest::new(method.clone(), *path);
                let mut res = HandlerResponse::new();
                let result = dispatcher.dispatch(&mut req, &mut res);
                black_box((&result, &res));
            }
        })
    });
}

criterion_group!(benches, bench_template_match, bench_dispatch);
criterion_main!(benches);
