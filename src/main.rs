fn main() {
    quick_notes_lib::run()
}
