use reactive_graph::*;

fn main() {
    let root = create_root(|| {
        let trigger = cell_with_eq((), |_, _| false);
        let data = cell(0);
        observer(move || {
            trigger.get();
            let a = data.get();
            dbg!(a);
        });
    });
    // A write from outside the root that created it must re-enter through `run_in`.
    root.dispose();
}
