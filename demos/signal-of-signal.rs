use reactive_graph::*;

fn main() {
    create_root(|| {
        let data = cell(123);
        dbg!(data.get());
        let cell_of_cell = cell_with_eq(data, |_, _| false);
        dbg!(cell_of_cell.get().get());
    });
}
