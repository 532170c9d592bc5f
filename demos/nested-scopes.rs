use reactive_graph::*;

fn main() {
    create_root(|| {
        let outer = cell(0);
        let child = create_child_scope(move || {
            dbg!(outer.get());
            observer(move || {
                dbg!(outer.get());
            });
        });
        outer.set(1);
        child.dispose();
        // Doesn't call the observer because its owning scope has been disposed.
        outer.set(2);
    });
}
